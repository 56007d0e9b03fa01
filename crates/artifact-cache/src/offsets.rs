//! Seek offsets for video thumbnails and preview frames

use crate::ArtifactConfig;

/// Preview frames never seek closer than this to the end of the stream
const END_MARGIN_SECS: f64 = 0.5;

/// Smallest spacing between preview frames of a very short clip
const MIN_PREVIEW_STEP_SECS: f64 = 0.1;

/// Seek position for the grid thumbnail.
///
/// Clips shorter than the start threshold use 10% of their length so the
/// frame is inside the stream; everything else, including clips of unknown
/// length, seeks to the threshold.
pub fn thumbnail_offset(duration: Option<f64>, config: &ArtifactConfig) -> f64 {
    match duration {
        Some(d) if d.is_finite() && d < config.preview_start_secs => (d * 0.1).max(0.0),
        _ => config.preview_start_secs,
    }
}

/// Seek positions for the hover preview frames, always `preview_count` long
/// and non-decreasing.
///
/// With a known duration the frames split the clip into `count + 1` equal
/// segments and none lands later than half a second before the end. With
/// an unknown duration they step forward from the start threshold.
pub fn preview_offsets(duration: Option<f64>, config: &ArtifactConfig) -> Vec<f64> {
    let count = config.preview_count;
    match duration {
        Some(d) if d.is_finite() && d > 0.0 => {
            let step = (d / (count as f64 + 1.0)).max(MIN_PREVIEW_STEP_SECS);
            let latest = (d - END_MARGIN_SECS).max(0.0);
            (0..count)
                .map(|index| (step * (index as f64 + 1.0)).min(latest))
                .collect()
        }
        _ => (0..count)
            .map(|index| config.preview_start_secs + config.preview_step_secs * index as f64)
            .collect(),
    }
}
