//! Recursive discovery of recognized media files under the scan root

use anyhow::{bail, Result};
use artifact_cache::MediaKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// A recognized media file found by [`DirectoryScanner::scan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Path relative to the root, always `/`-separated
    pub relative: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    root: PathBuf,
    excluded: Vec<PathBuf>,
    follow_links: bool,
}

impl DirectoryScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
            follow_links: false,
        }
    }

    /// Prune `dir` and everything below it. Matched case-insensitively.
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let candidate = path.to_string_lossy();
        self.excluded
            .iter()
            .any(|dir| dir.to_string_lossy().eq_ignore_ascii_case(&candidate))
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        if is_hidden(entry) {
            return false;
        }
        !(entry.file_type().is_dir() && self.is_excluded(entry.path()))
    }

    /// Every recognized file under the root, ordered by relative path.
    ///
    /// Unreadable directories are logged and skipped; only a missing root is
    /// an error.
    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        if !self.root.is_dir() {
            bail!("Scan root is not a directory: {}", self.root.display());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_entry(|entry| self.keep(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            // Symlinked files count; symlinked directories are not followed
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }
            let Some(kind) = MediaKind::from_path(entry.path()) else {
                continue;
            };
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };

            files.push(ScannedFile {
                relative: to_slash(relative),
                path: entry.into_path(),
                kind,
            });
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        debug!(root = %self.root.display(), count = files.len(), "scan complete");
        Ok(files)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn to_slash(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
