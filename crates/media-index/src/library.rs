//! The library facade: reindex pipeline plus the query and mutation surface
//!
//! A reindex runs scan, hash, probe, generate and join in that order and
//! swaps the result into the [`MediaIndex`] in one step. Rating and play
//! mutations write through the [`RatingStore`] first and then patch the
//! live index, so they need no reindex to show up.

use crate::config::LibraryConfig;
use crate::entry::{MediaEntry, MediaView, ScanSnapshot};
use crate::error::{LibraryError, LibraryResult};
use crate::filter::ListQuery;
use crate::index::MediaIndex;
use crate::scanner::{DirectoryScanner, ScannedFile};
use anyhow::{Context, Result};
use artifact_cache::{
    ArtifactGenerator, ArtifactKind, ArtifactSet, ArtifactStatus, ContentHasher, ContentIdentity,
    DurationProber, GeneratorStats, HasherStats,
};
use chrono::{DateTime, Utc};
use media_probe::{DurationProbe, Ffmpeg, Ffprobe, FrameExtractor};
use parking_lot::Mutex;
use rating_db::RatingStore;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Outcome of [`Library::move_negative`]
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveReport {
    pub moved_files: Vec<String>,
    pub failed_files: Vec<String>,
    /// Counters of the reindex that followed the move
    pub scan: ScanSnapshot,
}

/// A scanned file after hashing and probing
struct IdentifiedFile {
    file: ScannedFile,
    identity: ContentIdentity,
    size: u64,
    modified: DateTime<Utc>,
    duration: Option<f64>,
}

pub struct Library {
    config: LibraryConfig,
    hasher: ContentHasher,
    prober: DurationProber,
    generator: ArtifactGenerator,
    store: RatingStore,
    index: MediaIndex,
    /// Held for the duration of a reindex; queries never take it
    reindex_lock: Mutex<()>,
    pool: Option<ThreadPool>,
}

impl Library {
    /// Open the library with `ffprobe` and `ffmpeg` as configured.
    pub fn open(config: LibraryConfig) -> Result<Self> {
        let probe = Arc::new(Ffprobe::new(&config.probe));
        let frames = Arc::new(Ffmpeg::new(&config.probe));
        Self::open_with_tools(config, probe, frames)
    }

    /// Open the library with explicit tool implementations.
    ///
    /// Loads both sidecar caches and the ratings database; the index starts
    /// empty until the first [`Library::trigger_reindex`].
    pub fn open_with_tools(
        config: LibraryConfig,
        probe: Arc<dyn DurationProbe>,
        frames: Arc<dyn FrameExtractor>,
    ) -> Result<Self> {
        fs::create_dir_all(&config.metadata_dir).with_context(|| {
            format!("Failed to create metadata dir: {}", config.metadata_dir.display())
        })?;

        let store = RatingStore::open_at(&config.ratings_db_path())?;
        let hasher =
            ContentHasher::open(&config.hash_cache_path()).with_chunk_size(config.hash_chunk_size);
        let prober = DurationProber::open(&config.duration_cache_path(), probe);
        let generator =
            ArtifactGenerator::new(&config.metadata_dir, config.artifacts.clone(), frames)?;

        let pool = if config.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .thread_name(|i| format!("reindex-{}", i))
                .build()
                .context("Failed to build reindex thread pool")?;
            Some(pool)
        } else {
            None
        };

        info!(
            root = %config.root.display(),
            metadata = %config.metadata_dir.display(),
            workers = config.workers,
            "library opened"
        );

        Ok(Self {
            config,
            hasher,
            prober,
            generator,
            store,
            index: MediaIndex::new(),
            reindex_lock: Mutex::new(()),
            pool,
        })
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    fn scanner(&self) -> DirectoryScanner {
        self.config
            .excluded_dirs()
            .into_iter()
            .fold(DirectoryScanner::new(&self.config.root), |scanner, dir| {
                scanner.exclude(dir)
            })
    }

    /// Run `f` over `items` on the reindex pool, or inline with one worker.
    /// Output keeps input order.
    fn map_files<I, O, F>(&self, items: &[I], f: F) -> Vec<O>
    where
        I: Sync,
        O: Send,
        F: Fn(&I) -> Option<O> + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| items.par_iter().filter_map(&f).collect()),
            None => items.iter().filter_map(&f).collect(),
        }
    }

    // -- Reindex --

    /// Rebuild the index from the filesystem and return the new counters.
    ///
    /// Files that vanish mid-scan are left out; tool failures only degrade
    /// the affected file. Concurrent calls run one after another.
    pub fn trigger_reindex(&self) -> Result<ScanSnapshot> {
        let _guard = self.reindex_lock.lock();
        let started = Instant::now();
        let hashed_before = self.hasher.stats().files_read;

        let files = self.scanner().scan()?;
        debug!(count = files.len(), "scanned library");

        let identified = self.map_files(&files, |file| self.identify(file));
        self.hasher.prune_untouched();

        // One generation job per distinct content, since artifact names
        // depend on the identity alone. A video copy wins over an image copy
        // of the same bytes: its artifact set covers the image's.
        let mut representative: HashMap<&ContentIdentity, &IdentifiedFile> = HashMap::new();
        for item in &identified {
            let slot = representative.entry(&item.identity).or_insert(item);
            if item.file.kind.is_video() && !slot.file.kind.is_video() {
                *slot = item;
            }
        }
        let jobs: Vec<&IdentifiedFile> = representative.into_values().collect();
        let artifacts: HashMap<ContentIdentity, ArtifactSet> = self
            .map_files(&jobs, |item| {
                let set = self.generator.ensure(
                    &item.file.path,
                    &item.identity,
                    item.file.kind,
                    item.duration,
                );
                Some((item.identity.clone(), set))
            })
            .into_iter()
            .collect();

        let metadata = self.store.load_all()?;
        let mut entries: Vec<MediaEntry> = identified
            .into_iter()
            .map(|item| {
                let record = metadata.get(item.identity.as_str()).cloned().unwrap_or_default();
                let mut artifacts = artifacts.get(&item.identity).cloned().unwrap_or_default();
                if !item.file.kind.is_video() {
                    artifacts.previews.clear();
                }
                let name = item
                    .file
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();

                MediaEntry {
                    relative_path: item.file.relative,
                    name,
                    identity: item.identity,
                    kind: item.file.kind,
                    size: item.size,
                    modified: item.modified,
                    artifacts,
                    rating: record.score,
                    play_count: record.play_count,
                    duration: item.duration,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let snapshot = ScanSnapshot::from_entries(&entries, Utc::now());
        self.index.swap(entries, snapshot.clone());

        if let Err(e) = self.flush_caches() {
            warn!(error = %format!("{:#}", e), "failed to persist caches");
        }

        info!(
            total = snapshot.total,
            videos = snapshot.videos,
            images = snapshot.images,
            hashed = self.hasher.stats().files_read - hashed_before,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reindex complete"
        );
        Ok(snapshot)
    }

    fn identify(&self, file: &ScannedFile) -> Option<IdentifiedFile> {
        let metadata = match fs::metadata(&file.path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "file vanished, skipping");
                return None;
            }
        };
        let identity = match self.hasher.identity(&file.path) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(path = %file.path.display(), error = %format!("{:#}", e), "hashing failed, skipping");
                return None;
            }
        };
        let duration = if file.kind.is_video() {
            self.prober.duration(&identity, &file.path)
        } else {
            None
        };
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH));

        Some(IdentifiedFile {
            file: file.clone(),
            identity,
            size: metadata.len(),
            modified,
            duration,
        })
    }

    /// Persist the hash and duration caches if they changed.
    pub fn flush_caches(&self) -> Result<()> {
        self.hasher.flush()?;
        self.prober.flush()?;
        Ok(())
    }

    // -- Queries --

    pub fn list_entries(&self, query: &ListQuery) -> Vec<MediaView> {
        self.index.query(query).iter().map(MediaView::from).collect()
    }

    /// Every entry of the current index, in scan order
    pub fn entries(&self) -> Vec<MediaEntry> {
        self.index.entries()
    }

    pub fn scan_snapshot(&self) -> ScanSnapshot {
        self.index.scan_snapshot()
    }

    pub fn lookup(&self, relative_path: &str) -> LibraryResult<MediaEntry> {
        self.index
            .lookup(relative_path)
            .ok_or_else(|| LibraryError::NotFound(relative_path.to_string()))
    }

    /// Relative paths of indexed files scored strictly below `threshold`
    pub fn list_below_threshold(&self, threshold: i64) -> Vec<String> {
        self.index
            .entries()
            .into_iter()
            .filter(|entry| entry.rating < threshold)
            .map(|entry| entry.relative_path)
            .collect()
    }

    // -- Mutations --

    /// Apply a +1 or -1 vote to `hash` and return the new score.
    pub fn rate(&self, hash: &str, delta: i64) -> LibraryResult<i64> {
        let identity = parse_identity(hash)?;
        if delta != 1 && delta != -1 {
            return Err(LibraryError::InvalidDelta(delta));
        }

        let score = self.store.apply_rating_delta(identity.as_str(), delta)?;
        let patched = self.index.patch_rating(&identity, score);
        debug!(hash = %identity, delta, score, patched, "rating updated");
        Ok(score)
    }

    /// Count one playback of `hash` and return the new count.
    pub fn record_play(&self, hash: &str) -> LibraryResult<i64> {
        let identity = parse_identity(hash)?;
        let count = self.store.increment_play_count(identity.as_str())?;
        let patched = self.index.patch_play_count(&identity, count);
        debug!(hash = %identity, count, patched, "play recorded");
        Ok(count)
    }

    /// Move every negatively rated file into the minus directory, keeping its
    /// sub-path, then reindex.
    pub fn move_negative(&self) -> Result<MoveReport> {
        let minus_dir = &self.config.minus_dir;
        fs::create_dir_all(minus_dir)
            .with_context(|| format!("Failed to create {}", minus_dir.display()))?;

        let mut report = MoveReport::default();
        for relative in self.list_below_threshold(0) {
            let source = self.config.root.join(&relative);
            let dest = minus_dir.join(&relative);
            match move_file(&source, &dest) {
                Ok(()) => {
                    info!(from = %source.display(), to = %dest.display(), "moved negatively rated file");
                    report.moved_files.push(relative);
                }
                Err(e) => {
                    warn!(path = %relative, error = %format!("{:#}", e), "failed to move file");
                    report.failed_files.push(relative);
                }
            }
        }

        report.scan = self.trigger_reindex()?;
        Ok(report)
    }

    // -- Path resolution --

    /// Absolute path of an existing media file addressed relative to the root
    pub fn resolve_media_path(&self, relative: &str) -> LibraryResult<PathBuf> {
        let path = self.config.root.join(safe_relative(relative)?);
        if !path.is_file() {
            return Err(LibraryError::NotFound(relative.to_string()));
        }
        Ok(path)
    }

    /// Absolute path of a generated artifact. Failure sentinels resolve too.
    pub fn resolve_artifact(&self, kind: ArtifactKind, name: &str) -> LibraryResult<PathBuf> {
        let name_path = safe_relative(name)?;
        if name_path.components().count() != 1 {
            return Err(LibraryError::OutsideRoot(name.to_string()));
        }
        if self.generator.status(kind, name) == ArtifactStatus::Missing {
            return Err(LibraryError::NotFound(name.to_string()));
        }
        Ok(self.generator.artifact_path(kind, name))
    }

    // -- Statistics --

    pub fn hasher_stats(&self) -> HasherStats {
        self.hasher.stats()
    }

    pub fn generator_stats(&self) -> GeneratorStats {
        self.generator.stats()
    }

    pub fn probes_run(&self) -> u64 {
        self.prober.probes_run()
    }
}

fn parse_identity(hash: &str) -> LibraryResult<ContentIdentity> {
    let hash = hash.trim();
    if hash.is_empty() {
        return Err(LibraryError::MissingIdentity);
    }
    hash.parse()
        .map_err(|_| LibraryError::InvalidIdentity(hash.to_string()))
}

/// Reject absolute paths and any component that climbs out of the base.
fn safe_relative(relative: &str) -> LibraryResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(LibraryError::OutsideRoot(relative.to_string()));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(LibraryError::NotFound(relative.to_string()));
    }
    Ok(clean)
}

fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if !source.is_file() {
        anyhow::bail!("Source no longer exists: {}", source.display());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    // Different filesystem: copy then delete
    fs::copy(source, dest)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
    fs::remove_file(source).with_context(|| format!("Failed to remove {}", source.display()))?;
    Ok(())
}
