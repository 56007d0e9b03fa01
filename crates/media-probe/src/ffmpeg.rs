//! Single-frame extraction via ffmpeg

use crate::tool::{run_with_timeout, ToolError};
use crate::ProbeConfig;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Grabs one frame at `offset_secs` from `source`, scaled to `width` pixels
/// wide with the aspect ratio preserved, and writes it to `dest`.
pub trait FrameExtractor: Send + Sync {
    fn extract_frame(
        &self,
        source: &Path,
        dest: &Path,
        offset_secs: f64,
        width: u32,
    ) -> Result<(), ToolError>;
}

/// [`FrameExtractor`] backed by the `ffmpeg` binary
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: String,
    timeout: Duration,
}

impl Ffmpeg {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            program: config.ffmpeg_bin.clone(),
            timeout: config.frame_timeout,
        }
    }
}

impl FrameExtractor for Ffmpeg {
    fn extract_frame(
        &self,
        source: &Path,
        dest: &Path,
        offset_secs: f64,
        width: u32,
    ) -> Result<(), ToolError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| ToolError::Io {
                program: self.program.clone(),
                source,
            })?;
        }

        let output = run_with_timeout(
            &self.program,
            frame_args(source, dest, offset_secs, width),
            self.timeout,
        )?;

        // Seeking past the last keyframe exits 0 without writing anything
        let written = fs::metadata(dest).map(|meta| meta.len() > 0).unwrap_or(false);
        if !written {
            return Err(ToolError::NoOutput {
                program: self.program.clone(),
                dest: dest.to_path_buf(),
            });
        }

        if !output.stderr.is_empty() {
            debug!(
                source = %source.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ffmpeg diagnostics"
            );
        }
        Ok(())
    }
}

/// Argument list for a fast-seek single frame grab
pub fn frame_args(source: &Path, dest: &Path, offset_secs: f64, width: u32) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-ss".into(),
        format!("{:.3}", offset_secs.max(0.0)).into(),
        "-i".into(),
        source.as_os_str().to_os_string(),
        "-frames:v".into(),
        "1".into(),
        "-vf".into(),
        format!("scale={}:-1", width).into(),
        dest.as_os_str().to_os_string(),
    ]
}
