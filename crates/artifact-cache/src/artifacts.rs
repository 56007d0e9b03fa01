//! Thumbnail and preview-frame generation with permanent failure markers
//!
//! Artifact names are derived from the content identity alone, so the
//! presence of a file at the expected name is enough to know generation was
//! already attempted. A failed attempt leaves a zero-length sentinel at that
//! name; it counts as attempted and is never retried by this process.

use crate::generate::{generate_image_thumbnail, ImageThumbnail};
use crate::identity::{ContentIdentity, MediaKind};
use crate::offsets::{preview_offsets, thumbnail_offset};
use crate::ArtifactConfig;
use anyhow::{bail, Context, Result};
use media_probe::{FrameExtractor, ToolError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directory names under the metadata root
pub const THUMBNAIL_DIR: &str = "thumbnails";
pub const PREVIEW_DIR: &str = "previews";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Thumbnail,
    Preview,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Thumbnail => write!(f, "thumbnail"),
            ArtifactKind::Preview => write!(f, "preview"),
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "thumbnail" | "thumbnails" => Ok(ArtifactKind::Thumbnail),
            "preview" | "previews" => Ok(ArtifactKind::Preview),
            _ => bail!("Invalid artifact kind: {}. Valid options: thumbnail, preview", s),
        }
    }
}

/// Artifact file names for one media file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    pub thumbnail: String,
    /// Empty for images; `preview_count` names for videos, in frame order
    pub previews: Vec<String>,
}

/// State of a single artifact file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Missing,
    Ready,
    /// Zero-length sentinel from a failed attempt
    Failed,
}

pub fn thumbnail_name(identity: &ContentIdentity) -> String {
    format!("{}.jpg", identity)
}

pub fn preview_name(identity: &ContentIdentity, index: usize) -> String {
    format!("{}_{}.jpg", identity, index)
}

/// Generator counters for monitoring and for asserting idempotence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub frames_extracted: u64,
    pub images_encoded: u64,
    pub originals_copied: u64,
    pub sentinels_written: u64,
}

/// Produces thumbnails and preview frames under the metadata directory
pub struct ArtifactGenerator {
    thumb_dir: PathBuf,
    preview_dir: PathBuf,
    config: ArtifactConfig,
    frames: Arc<dyn FrameExtractor>,
    frames_extracted: AtomicU64,
    images_encoded: AtomicU64,
    originals_copied: AtomicU64,
    sentinels_written: AtomicU64,
    missing_reported: AtomicBool,
}

impl ArtifactGenerator {
    /// Create the generator, making `thumbnails/` and `previews/` under
    /// `metadata_dir` if needed.
    pub fn new(
        metadata_dir: &Path,
        config: ArtifactConfig,
        frames: Arc<dyn FrameExtractor>,
    ) -> Result<Self> {
        let thumb_dir = metadata_dir.join(THUMBNAIL_DIR);
        let preview_dir = metadata_dir.join(PREVIEW_DIR);
        for dir in [&thumb_dir, &preview_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create artifact directory: {}", dir.display()))?;
        }

        Ok(Self {
            thumb_dir,
            preview_dir,
            config,
            frames,
            frames_extracted: AtomicU64::new(0),
            images_encoded: AtomicU64::new(0),
            originals_copied: AtomicU64::new(0),
            sentinels_written: AtomicU64::new(0),
            missing_reported: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ArtifactConfig {
        &self.config
    }

    /// On-disk location of an artifact name
    pub fn artifact_path(&self, kind: ArtifactKind, name: &str) -> PathBuf {
        match kind {
            ArtifactKind::Thumbnail => self.thumb_dir.join(name),
            ArtifactKind::Preview => self.preview_dir.join(name),
        }
    }

    pub fn status(&self, kind: ArtifactKind, name: &str) -> ArtifactStatus {
        match fs::metadata(self.artifact_path(kind, name)) {
            Ok(meta) if meta.len() > 0 => ArtifactStatus::Ready,
            Ok(_) => ArtifactStatus::Failed,
            Err(_) => ArtifactStatus::Missing,
        }
    }

    /// Make sure every artifact for `identity` has been attempted and return
    /// their names.
    ///
    /// Idempotent: any file already present at an expected name, including a
    /// failure sentinel, is left alone and the generating tool is not run.
    pub fn ensure(
        &self,
        source: &Path,
        identity: &ContentIdentity,
        kind: MediaKind,
        duration: Option<f64>,
    ) -> ArtifactSet {
        let thumbnail = thumbnail_name(identity);
        let thumb_path = self.artifact_path(ArtifactKind::Thumbnail, &thumbnail);

        if !thumb_path.exists() {
            match kind {
                MediaKind::Video => {
                    let offset = thumbnail_offset(duration, &self.config);
                    self.ensure_frame(source, &thumb_path, offset);
                }
                MediaKind::Image => self.ensure_image(source, &thumb_path),
            }
        }

        let previews = match kind {
            MediaKind::Image => Vec::new(),
            MediaKind::Video => preview_offsets(duration, &self.config)
                .into_iter()
                .enumerate()
                .map(|(index, offset)| {
                    let name = preview_name(identity, index);
                    let path = self.artifact_path(ArtifactKind::Preview, &name);
                    if !path.exists() {
                        self.ensure_frame(source, &path, offset);
                    }
                    name
                })
                .collect(),
        };

        ArtifactSet {
            thumbnail,
            previews,
        }
    }

    fn ensure_frame(&self, source: &Path, dest: &Path, offset: f64) {
        // ffmpeg picks the muxer from the extension, so keep `.jpg` last
        let partial = partial_path(dest);
        self.frames_extracted.fetch_add(1, Ordering::Relaxed);

        let extracted = self
            .frames
            .extract_frame(source, &partial, offset, self.config.thumb_width)
            .and_then(|()| {
                fs::rename(&partial, dest).map_err(|source| ToolError::Io {
                    program: "rename".to_string(),
                    source,
                })
            });

        match extracted {
            Ok(()) => debug!(source = %source.display(), offset, dest = %dest.display(), "extracted frame"),
            Err(e) => {
                let _ = fs::remove_file(&partial);
                self.report_tool_failure(source, &e);
                self.write_sentinel(dest);
            }
        }
    }

    fn ensure_image(&self, source: &Path, dest: &Path) {
        match generate_image_thumbnail(source, dest, self.config.thumb_width, self.config.jpeg_quality) {
            Ok(ImageThumbnail::Encoded) => {
                self.images_encoded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(ImageThumbnail::CopiedOriginal) => {
                self.originals_copied.fetch_add(1, Ordering::Relaxed);
                info!(source = %source.display(), "no decoder for image, using original bytes as thumbnail");
            }
            Err(e) => {
                warn!(source = %source.display(), error = %e, "image thumbnail failed");
                self.write_sentinel(dest);
            }
        }
    }

    fn report_tool_failure(&self, source: &Path, error: &ToolError) {
        if error.is_not_installed() {
            if !self.missing_reported.swap(true, Ordering::Relaxed) {
                warn!(error = %error, "frame extractor unavailable, video artifacts will be placeholders");
            }
        } else {
            warn!(source = %source.display(), error = %error, "frame extraction failed");
        }
    }

    fn write_sentinel(&self, dest: &Path) {
        match fs::write(dest, b"") {
            Ok(()) => {
                self.sentinels_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(dest = %dest.display(), error = %e, "failed to write failure sentinel"),
        }
    }

    pub fn stats(&self) -> GeneratorStats {
        GeneratorStats {
            frames_extracted: self.frames_extracted.load(Ordering::Relaxed),
            images_encoded: self.images_encoded.load(Ordering::Relaxed),
            originals_copied: self.originals_copied.load(Ordering::Relaxed),
            sentinels_written: self.sentinels_written.load(Ordering::Relaxed),
        }
    }
}

/// `abc_3.jpg` -> `abc_3.partial.jpg`
fn partial_path(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{}.partial.jpg", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_file;
    use image::RgbImage;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    /// Records every call; writes a tiny file on success
    struct FakeFrames {
        calls: Mutex<Vec<f64>>,
        fail: bool,
    }

    impl FakeFrames {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    impl FrameExtractor for FakeFrames {
        fn extract_frame(
            &self,
            _source: &Path,
            dest: &Path,
            offset_secs: f64,
            _width: u32,
        ) -> Result<(), ToolError> {
            self.calls.lock().push(offset_secs);
            if self.fail {
                return Err(ToolError::TimedOut {
                    program: "ffmpeg".to_string(),
                    timeout: std::time::Duration::from_secs(60),
                });
            }
            fs::write(dest, b"jpeg").map_err(|source| ToolError::Io {
                program: "ffmpeg".to_string(),
                source,
            })
        }
    }

    fn video(dir: &Path) -> (PathBuf, ContentIdentity) {
        let path = dir.join("clip.mp4");
        fs::write(&path, b"not really a video").unwrap();
        let identity = hash_file(&path, 4096).unwrap();
        (path, identity)
    }

    #[test]
    fn test_video_artifacts_named_from_identity() -> Result<()> {
        let dir = tempdir()?;
        let frames = FakeFrames::new(false);
        let generator = ArtifactGenerator::new(&dir.path().join("meta"), ArtifactConfig::default(), frames.clone())?;
        let (path, identity) = video(dir.path());

        let set = generator.ensure(&path, &identity, MediaKind::Video, Some(90.0));
        assert_eq!(set.thumbnail, format!("{}.jpg", identity));
        assert_eq!(set.previews.len(), 8);
        assert_eq!(set.previews[3], format!("{}_3.jpg", identity));
        assert_eq!(frames.call_count(), 9);

        assert_eq!(generator.status(ArtifactKind::Thumbnail, &set.thumbnail), ArtifactStatus::Ready);
        for name in &set.previews {
            assert_eq!(generator.status(ArtifactKind::Preview, name), ArtifactStatus::Ready);
        }
        // Thumbnail offset first, then previews in order
        let calls = frames.calls.lock().clone();
        assert_eq!(calls[0], 10.0);
        assert_eq!(&calls[1..], &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0]);
        Ok(())
    }

    #[test]
    fn test_ensure_twice_runs_tool_once() -> Result<()> {
        let dir = tempdir()?;
        let frames = FakeFrames::new(false);
        let generator = ArtifactGenerator::new(dir.path(), ArtifactConfig::default(), frames.clone())?;
        let (path, identity) = video(dir.path());

        let first = generator.ensure(&path, &identity, MediaKind::Video, Some(30.0));
        let second = generator.ensure(&path, &identity, MediaKind::Video, Some(30.0));
        assert_eq!(first, second);
        assert_eq!(frames.call_count(), 9);
        Ok(())
    }

    #[test]
    fn test_failure_sentinel_suppresses_retry() -> Result<()> {
        let dir = tempdir()?;
        let frames = FakeFrames::new(true);
        let generator = ArtifactGenerator::new(dir.path(), ArtifactConfig::default(), frames.clone())?;
        let (path, identity) = video(dir.path());

        let set = generator.ensure(&path, &identity, MediaKind::Video, None);
        assert_eq!(frames.call_count(), 9);
        assert_eq!(generator.stats().sentinels_written, 9);

        let thumb = generator.artifact_path(ArtifactKind::Thumbnail, &set.thumbnail);
        assert_eq!(fs::metadata(&thumb)?.len(), 0);
        assert_eq!(generator.status(ArtifactKind::Thumbnail, &set.thumbnail), ArtifactStatus::Failed);

        generator.ensure(&path, &identity, MediaKind::Video, None);
        assert_eq!(frames.call_count(), 9);
        Ok(())
    }

    #[test]
    fn test_no_partial_files_left_behind() -> Result<()> {
        let dir = tempdir()?;
        let generator = ArtifactGenerator::new(dir.path(), ArtifactConfig::default(), FakeFrames::new(true))?;
        let (path, identity) = video(dir.path());
        generator.ensure(&path, &identity, MediaKind::Video, Some(12.0));

        let leftovers = fs::read_dir(dir.path().join(PREVIEW_DIR))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".partial."))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[test]
    fn test_image_thumbnail_has_no_previews() -> Result<()> {
        let dir = tempdir()?;
        let frames = FakeFrames::new(false);
        let generator = ArtifactGenerator::new(dir.path(), ArtifactConfig::default(), frames.clone())?;

        let source = dir.path().join("photo.png");
        RgbImage::from_pixel(64, 48, image::Rgb([10, 20, 30])).save(&source)?;
        let identity = hash_file(&source, 4096)?;

        let set = generator.ensure(&source, &identity, MediaKind::Image, None);
        assert!(set.previews.is_empty());
        assert_eq!(frames.call_count(), 0);
        assert_eq!(generator.stats().images_encoded, 1);
        assert_eq!(generator.status(ArtifactKind::Thumbnail, &set.thumbnail), ArtifactStatus::Ready);

        generator.ensure(&source, &identity, MediaKind::Image, None);
        assert_eq!(generator.stats().images_encoded, 1);
        Ok(())
    }

    #[test]
    fn test_corrupt_image_gets_sentinel() -> Result<()> {
        let dir = tempdir()?;
        let generator = ArtifactGenerator::new(dir.path(), ArtifactConfig::default(), FakeFrames::new(false))?;
        let source = dir.path().join("broken.png");
        fs::write(&source, b"garbage")?;
        let identity = hash_file(&source, 4096)?;

        let set = generator.ensure(&source, &identity, MediaKind::Image, None);
        assert_eq!(generator.status(ArtifactKind::Thumbnail, &set.thumbnail), ArtifactStatus::Failed);
        Ok(())
    }

    #[test]
    fn test_artifact_kind_parsing() {
        assert_eq!("thumbnail".parse::<ArtifactKind>().unwrap(), ArtifactKind::Thumbnail);
        assert_eq!("Previews".parse::<ArtifactKind>().unwrap(), ArtifactKind::Preview);
        assert!("poster".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn test_partial_path_keeps_extension() {
        assert_eq!(
            partial_path(Path::new("/m/previews/abc_3.jpg")),
            PathBuf::from("/m/previews/abc_3.partial.jpg")
        );
    }
}
