//! External media tooling for the media web viewer
//!
//! This crate wraps the two command-line tools the indexer depends on:
//! `ffprobe` for container duration inspection and `ffmpeg` for single-frame
//! extraction. Every invocation runs under a hard wall-clock timeout and
//! failures are classified so callers can tell "tool missing" apart from
//! "tool ran and failed".
//!
//! # Seams
//!
//! - [`DurationProbe`]: container duration lookup, implemented by [`Ffprobe`]
//! - [`FrameExtractor`]: frame-at-offset extraction, implemented by [`Ffmpeg`]
//!
//! Both traits are object safe so the indexer can hold them as
//! `Arc<dyn ...>` and tests can substitute counting fakes.

pub mod ffmpeg;
pub mod ffprobe;
pub mod tool;

pub use ffmpeg::{Ffmpeg, FrameExtractor};
pub use ffprobe::{parse_duration, DurationProbe, Ffprobe};
pub use tool::{run_with_timeout, ToolError, ToolOutput};

use std::time::Duration;

/// Binaries and time limits for external tool invocations
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    /// Upper bound for a single frame extraction
    pub frame_timeout: Duration,
    /// Upper bound for a single duration probe
    pub probe_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            frame_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(30),
        }
    }
}
