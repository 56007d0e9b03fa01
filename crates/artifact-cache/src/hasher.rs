//! Streaming SHA-256 content hashing, memoized by file signature

use crate::identity::{ContentIdentity, Signature};
use crate::sidecar::SidecarMap;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// File name of the hash cache inside the metadata directory
pub const HASH_CACHE_FILE: &str = "hash_cache.json";

/// Bytes read per chunk while hashing
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Cached hash for one absolute path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashRecord {
    pub sig: Signature,
    pub hash: ContentIdentity,
}

/// Hasher counters, for monitoring and for asserting cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HasherStats {
    /// Lookups answered from the cache without reading the file
    pub cache_hits: u64,
    /// Files whose bytes were actually read and digested
    pub files_read: u64,
}

/// Computes [`ContentIdentity`] values, skipping the read entirely when a
/// file's (mtime, size) signature matches the cached one.
pub struct ContentHasher {
    cache: Mutex<SidecarMap<HashRecord>>,
    /// Keys looked up since the last [`ContentHasher::prune_untouched`]
    touched: Mutex<HashSet<String>>,
    chunk_size: usize,
    cache_hits: AtomicU64,
    files_read: AtomicU64,
}

impl ContentHasher {
    /// Load the persisted cache at `cache_path` (empty if missing or corrupt).
    pub fn open(cache_path: &Path) -> Self {
        Self {
            cache: Mutex::new(SidecarMap::load(cache_path)),
            touched: Mutex::new(HashSet::new()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_hits: AtomicU64::new(0),
            files_read: AtomicU64::new(0),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Identity of the file at `path`.
    ///
    /// Fails if the file cannot be stat'ed or read; callers treat that as the
    /// file having vanished and leave it out of the current scan.
    pub fn identity(&self, path: &Path) -> Result<ContentIdentity> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        let key = absolute.to_string_lossy().into_owned();
        let sig = Signature::of(&absolute)?;

        if let Some(record) = self.cache.lock().get(&key) {
            if record.sig == sig {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.touched.lock().insert(key);
                return Ok(record.hash.clone());
            }
        }

        let hash = hash_file(&absolute, self.chunk_size)?;
        self.files_read.fetch_add(1, Ordering::Relaxed);
        debug!(path = %absolute.display(), %hash, "hashed file");

        self.touched.lock().insert(key.clone());
        self.cache.lock().insert(
            key,
            HashRecord {
                sig,
                hash: hash.clone(),
            },
        );
        Ok(hash)
    }

    /// Forget cached paths that were not looked up since the previous call,
    /// so entries for deleted or moved files do not pile up. Returns how many
    /// were dropped.
    pub fn prune_untouched(&self) -> usize {
        let touched = std::mem::take(&mut *self.touched.lock());
        let removed = self.cache.lock().retain(|key, _| touched.contains(key));
        if removed > 0 {
            debug!(removed, "pruned stale hash cache entries");
        }
        removed
    }

    /// Persist the cache if any entry changed.
    pub fn flush(&self) -> Result<bool> {
        self.cache.lock().flush()
    }

    pub fn stats(&self) -> HasherStats {
        HasherStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            files_read: self.files_read.load(Ordering::Relaxed),
        }
    }

    pub fn cached_paths(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Digest a file in `chunk_size` pieces without holding it all in memory.
pub fn hash_file(path: &Path, chunk_size: usize) -> Result<ContentIdentity> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let n = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(ContentIdentity::from_digest(&hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_identical_bytes_share_identity() -> Result<()> {
        let dir = tempdir()?;
        let hasher = ContentHasher::open(&dir.path().join(HASH_CACHE_FILE));

        let a = dir.path().join("a.jpg");
        let b = dir.path().join("sub_b.png");
        fs::write(&a, b"same bytes")?;
        fs::write(&b, b"same bytes")?;
        let c = dir.path().join("c.jpg");
        fs::write(&c, b"other bytes")?;

        assert_eq!(hasher.identity(&a)?, hasher.identity(&b)?);
        assert_ne!(hasher.identity(&a)?, hasher.identity(&c)?);
        Ok(())
    }

    #[test]
    fn test_known_digest() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("abc.jpg");
        fs::write(&path, b"abc")?;
        // Small chunks force several update() calls
        let identity = hash_file(&path, 2)?;
        assert_eq!(
            identity.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }

    #[test]
    fn test_unchanged_file_is_not_reread() -> Result<()> {
        let dir = tempdir()?;
        let hasher = ContentHasher::open(&dir.path().join(HASH_CACHE_FILE));
        let path = dir.path().join("a.mp4");
        fs::write(&path, b"video bytes")?;

        let first = hasher.identity(&path)?;
        for _ in 0..3 {
            assert_eq!(hasher.identity(&path)?, first);
        }
        let stats = hasher.stats();
        assert_eq!(stats.files_read, 1);
        assert_eq!(stats.cache_hits, 3);
        Ok(())
    }

    #[test]
    fn test_changed_signature_rehashes() -> Result<()> {
        let dir = tempdir()?;
        let hasher = ContentHasher::open(&dir.path().join(HASH_CACHE_FILE));
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"v1")?;
        let first = hasher.identity(&path)?;

        fs::write(&path, b"version two")?;
        let second = hasher.identity(&path)?;
        assert_ne!(first, second);
        assert_eq!(hasher.stats().files_read, 2);
        Ok(())
    }

    #[test]
    fn test_cache_survives_reopen() -> Result<()> {
        let dir = tempdir()?;
        let cache_path = dir.path().join(HASH_CACHE_FILE);
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"persisted")?;

        let hasher = ContentHasher::open(&cache_path);
        let identity = hasher.identity(&path)?;
        assert!(hasher.flush()?);
        assert!(!hasher.flush()?);

        let reopened = ContentHasher::open(&cache_path);
        assert_eq!(reopened.cached_paths(), 1);
        assert_eq!(reopened.identity(&path)?, identity);
        assert_eq!(reopened.stats().files_read, 0);
        Ok(())
    }

    #[test]
    fn test_prune_forgets_paths_not_seen_again() -> Result<()> {
        let dir = tempdir()?;
        let cache_path = dir.path().join(HASH_CACHE_FILE);
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        fs::write(&a, b"a")?;
        fs::write(&b, b"b")?;

        let hasher = ContentHasher::open(&cache_path);
        hasher.identity(&a)?;
        hasher.identity(&b)?;
        assert_eq!(hasher.prune_untouched(), 0);
        hasher.flush()?;

        fs::remove_file(&b)?;
        hasher.identity(&a)?;
        assert_eq!(hasher.prune_untouched(), 1);
        assert_eq!(hasher.cached_paths(), 1);
        assert!(hasher.flush()?);

        let reopened = ContentHasher::open(&cache_path);
        assert_eq!(reopened.cached_paths(), 1);
        assert_eq!(reopened.identity(&a)?, hasher.identity(&a)?);
        assert_eq!(reopened.stats().files_read, 0);
        Ok(())
    }

    #[test]
    fn test_vanished_file_is_error() {
        let dir = tempdir().unwrap();
        let hasher = ContentHasher::open(&dir.path().join(HASH_CACHE_FILE));
        assert!(hasher.identity(&dir.path().join("gone.jpg")).is_err());
    }
}
