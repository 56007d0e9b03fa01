//! Index rows, scan counters and the serialized view handed to clients

use artifact_cache::{ArtifactSet, ContentIdentity, MediaKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One discovered file, joined with its identity, artifacts and user metadata
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEntry {
    pub relative_path: String,
    pub name: String,
    pub identity: ContentIdentity,
    pub kind: MediaKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub artifacts: ArtifactSet,
    pub rating: i64,
    pub play_count: i64,
    /// Video only; `None` until a probe succeeds
    pub duration: Option<f64>,
}

impl MediaEntry {
    /// True for files directly under the root
    pub fn is_top_level(&self) -> bool {
        !self.relative_path.contains('/')
    }

    pub fn view(&self) -> MediaView {
        MediaView::from(self)
    }
}

/// Counters describing the last completed reindex
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub total: usize,
    pub videos: usize,
    pub images: usize,
    /// `None` before the first reindex
    pub last_scan: Option<DateTime<Utc>>,
}

impl ScanSnapshot {
    pub fn from_entries(entries: &[MediaEntry], last_scan: DateTime<Utc>) -> Self {
        let videos = entries.iter().filter(|entry| entry.kind.is_video()).count();
        Self {
            total: entries.len(),
            videos,
            images: entries.len() - videos,
            last_scan: Some(last_scan),
        }
    }
}

/// Client-facing shape of a [`MediaEntry`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    pub relative_path: String,
    pub name: String,
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub modified: f64,
    pub thumbnail: String,
    pub previews: Vec<String>,
    pub rating: i64,
    pub duration: Option<f64>,
    pub formatted_duration: String,
    pub play_count: i64,
}

impl From<&MediaEntry> for MediaView {
    fn from(entry: &MediaEntry) -> Self {
        Self {
            relative_path: entry.relative_path.clone(),
            name: entry.name.clone(),
            hash: entry.identity.to_string(),
            kind: entry.kind,
            size: entry.size,
            modified: entry.modified.timestamp_millis() as f64 / 1000.0,
            thumbnail: entry.artifacts.thumbnail.clone(),
            previews: entry.artifacts.previews.clone(),
            rating: entry.rating,
            duration: entry.duration,
            formatted_duration: format_duration(entry.duration),
            play_count: entry.play_count,
        }
    }
}

/// `M:SS` below an hour, `H:MM:SS` above; empty when unknown or not positive.
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds.filter(|s| s.is_finite() && *s > 0.0) else {
        return String::new();
    };
    let total = seconds as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
