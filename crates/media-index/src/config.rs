//! Library layout and tuning knobs

use artifact_cache::{ArtifactConfig, DEFAULT_CHUNK_SIZE, DURATION_CACHE_FILE, HASH_CACHE_FILE};
use media_probe::ProbeConfig;
use rating_db::DB_FILE_NAME;
use std::path::{Path, PathBuf};

/// Name of the metadata directory created under the scan root
pub const METADATA_DIR_NAME: &str = "_metadata";

/// Name of the directory negatively rated files are moved into
pub const MINUS_DIR_NAME: &str = "_minus";

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub root: PathBuf,
    pub metadata_dir: PathBuf,
    pub minus_dir: PathBuf,
    pub hash_chunk_size: usize,
    /// Reindex worker threads; 1 keeps the pipeline fully sequential
    pub workers: usize,
    pub probe: ProbeConfig,
    pub artifacts: ArtifactConfig,
}

impl LibraryConfig {
    /// Defaults for a library rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            metadata_dir: root.join(METADATA_DIR_NAME),
            minus_dir: root.join(MINUS_DIR_NAME),
            root,
            hash_chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 1,
            probe: ProbeConfig::default(),
            artifacts: ArtifactConfig::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn ratings_db_path(&self) -> PathBuf {
        self.metadata_dir.join(DB_FILE_NAME)
    }

    pub fn hash_cache_path(&self) -> PathBuf {
        self.metadata_dir.join(HASH_CACHE_FILE)
    }

    pub fn duration_cache_path(&self) -> PathBuf {
        self.metadata_dir.join(DURATION_CACHE_FILE)
    }

    /// Directories the scanner must never descend into
    pub fn excluded_dirs(&self) -> Vec<&Path> {
        vec![self.metadata_dir.as_path(), self.minus_dir.as_path()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let config = LibraryConfig::new("/media/library");
        assert_eq!(config.metadata_dir, PathBuf::from("/media/library/_metadata"));
        assert_eq!(config.minus_dir, PathBuf::from("/media/library/_minus"));
        assert_eq!(
            config.ratings_db_path(),
            PathBuf::from("/media/library/_metadata/ratings.sqlite3")
        );
        assert_eq!(
            config.hash_cache_path(),
            PathBuf::from("/media/library/_metadata/hash_cache.json")
        );
        assert_eq!(
            config.duration_cache_path(),
            PathBuf::from("/media/library/_metadata/video_info.json")
        );
    }

    #[test]
    fn test_workers_never_zero() {
        assert_eq!(LibraryConfig::new("/x").with_workers(0).workers, 1);
        assert_eq!(LibraryConfig::new("/x").with_workers(4).workers, 4);
    }
}
