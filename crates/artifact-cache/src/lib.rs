//! Per-file derived data for the media web viewer
//!
//! Everything here is keyed by [`ContentIdentity`], the SHA-256 of a file's
//! bytes, so duplicate files share one set of derived data no matter where
//! they live in the library.
//!
//! # Features
//!
//! - **Content hashing**: streaming SHA-256, skipped when (mtime, size) is unchanged
//! - **Duration memoization**: one `ffprobe` run per distinct video
//! - **Artifacts**: grid thumbnail plus hover preview frames, with zero-length
//!   failure sentinels so broken media is never retried
//! - **Sidecar caches**: JSON documents written atomically beside the thumbnails

pub mod artifacts;
pub mod duration;
pub mod generate;
pub mod hasher;
pub mod identity;
pub mod offsets;
pub mod sidecar;

pub use artifacts::{
    preview_name, thumbnail_name, ArtifactGenerator, ArtifactKind, ArtifactSet, ArtifactStatus,
    GeneratorStats, PREVIEW_DIR, THUMBNAIL_DIR,
};
pub use duration::{DurationProber, DURATION_CACHE_FILE};
pub use generate::{generate_image_thumbnail, ImageThumbnail};
pub use hasher::{hash_file, ContentHasher, HasherStats, DEFAULT_CHUNK_SIZE, HASH_CACHE_FILE};
pub use identity::{ContentIdentity, MediaKind, Signature, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
pub use offsets::{preview_offsets, thumbnail_offset};
pub use sidecar::SidecarMap;

/// Artifact sizing and frame placement
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    /// Long-edge bound for image thumbnails, and output width for video frames
    pub thumb_width: u32,
    pub jpeg_quality: u8,
    /// Number of hover preview frames per video
    pub preview_count: usize,
    /// Thumbnail seek position, and first preview position when duration is unknown
    pub preview_start_secs: f64,
    pub preview_step_secs: f64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            thumb_width: 360,
            jpeg_quality: 85,
            preview_count: 8,
            preview_start_secs: 10.0,
            preview_step_secs: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ArtifactConfig::default();
        assert_eq!(config.thumb_width, 360);
        assert_eq!(config.preview_count, 8);
        assert!(config.jpeg_quality <= 100);
    }
}
