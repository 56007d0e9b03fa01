//! JSON key→value documents persisted beside the thumbnails
//!
//! A sidecar is loaded once, mutated in memory, and written back only when
//! something changed. Writes go through a temp file in the same directory
//! and are renamed into place, so a crash never leaves a half-written
//! document behind.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct SidecarMap<V> {
    path: PathBuf,
    entries: HashMap<String, V>,
    dirty: bool,
}

impl<V: Serialize + DeserializeOwned> SidecarMap<V> {
    /// Load the document at `path`. A missing or unreadable document yields
    /// an empty map; the next flush replaces it.
    pub fn load(path: &Path) -> Self {
        let entries = match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "discarding corrupt cache document");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache document unreadable, starting empty");
                HashMap::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, value: V) {
        self.entries.insert(key, value);
        self.dirty = true;
    }

    /// Drop every entry `keep` rejects. Returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &V) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, value| keep(key, value));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the document if it changed since the last load or flush.
    /// Returns whether anything was written.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let json = serde_json::to_vec_pretty(&self.entries)
            .context("Failed to serialize cache document")?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write cache document: {}", self.path.display()))?;

        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "flushed cache document");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_document_is_empty() {
        let dir = tempdir().unwrap();
        let map: SidecarMap<u32> = SidecarMap::load(&dir.path().join("absent.json"));
        assert!(map.is_empty());
        assert!(!map.is_dirty());
    }

    #[test]
    fn test_corrupt_document_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("cache.json");
        fs::write(&path, b"{ this is not json")?;

        let mut map: SidecarMap<u32> = SidecarMap::load(&path);
        assert!(map.is_empty());

        map.insert("k".to_string(), 7);
        assert!(map.flush()?);
        let reloaded: SidecarMap<u32> = SidecarMap::load(&path);
        assert_eq!(reloaded.get("k"), Some(&7));
        Ok(())
    }

    #[test]
    fn test_flush_only_when_dirty() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("cache.json");
        let mut map: SidecarMap<String> = SidecarMap::load(&path);

        assert!(!map.flush()?);
        assert!(!path.exists());

        map.insert("a".to_string(), "b".to_string());
        assert!(map.is_dirty());
        assert!(map.flush()?);
        assert!(!map.is_dirty());
        assert!(path.exists());

        assert!(!map.flush()?);
        Ok(())
    }

    #[test]
    fn test_retain_drops_rejected_keys() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("cache.json");
        let mut map: SidecarMap<u32> = SidecarMap::load(&path);
        map.insert("keep".to_string(), 1);
        map.insert("gone".to_string(), 2);
        map.flush()?;

        assert_eq!(map.retain(|key, _| key == "keep"), 1);
        assert!(map.is_dirty());
        assert!(map.flush()?);

        // Nothing removed, nothing to write
        assert_eq!(map.retain(|_, _| true), 0);
        assert!(!map.is_dirty());

        let reloaded: SidecarMap<u32> = SidecarMap::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("keep"), Some(&1));
        assert_eq!(reloaded.get("gone"), None);
        Ok(())
    }
}
