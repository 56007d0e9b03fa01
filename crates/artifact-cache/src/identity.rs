//! Content identity, change-detection signature and media kind

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Recognized still-image extensions (lowercase, without the dot)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Recognized video extensions (lowercase, without the dot)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "m4v"];

/// SHA-256 of a file's full byte content, as lowercase hex.
///
/// Files with identical bytes share one identity regardless of path, and
/// therefore share one rating, one play count and one artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentIdentity(String);

impl ContentIdentity {
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for ContentIdentity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("Invalid content identity: {:?} (expected 64 hex chars)", s);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

/// (modification time, size) pair. A file whose signature is unchanged is
/// assumed to have unchanged content and is not re-hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub modified_ns: i64,
    pub size: u64,
}

impl Signature {
    pub fn from_metadata(metadata: &Metadata) -> Result<Self> {
        let modified = metadata.modified().context("Modification time unavailable")?;
        let modified_ns = match modified.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_nanos() as i64,
            Err(before) => -(before.duration().as_nanos() as i64),
        };
        Ok(Self {
            modified_ns,
            size: metadata.len(),
        })
    }

    pub fn of(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        Self::from_metadata(&metadata)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by extension, case-insensitively. `None` for anything unrecognized.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaKind::Video)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}
