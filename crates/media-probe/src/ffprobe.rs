//! Container duration inspection via ffprobe's JSON report

use crate::tool::{run_with_timeout, ToolError};
use crate::ProbeConfig;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Source of a video's container duration in seconds.
///
/// `Ok(None)` means the tool ran but the report carried no duration.
pub trait DurationProbe: Send + Sync {
    fn probe_duration(&self, path: &Path) -> Result<Option<f64>, ToolError>;
}

/// [`DurationProbe`] backed by the `ffprobe` binary
#[derive(Debug, Clone)]
pub struct Ffprobe {
    program: String,
    timeout: Duration,
}

impl Ffprobe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            program: config.ffprobe_bin.clone(),
            timeout: config.probe_timeout,
        }
    }
}

impl DurationProbe for Ffprobe {
    fn probe_duration(&self, path: &Path) -> Result<Option<f64>, ToolError> {
        let args: [&OsStr; 7] = [
            OsStr::new("-v"),
            OsStr::new("quiet"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_format"),
            OsStr::new("-show_streams"),
            path.as_os_str(),
        ];
        let output = run_with_timeout(&self.program, args, self.timeout)?;
        let duration = parse_duration(&output.stdout).map_err(|source| ToolError::MalformedReport {
            program: self.program.clone(),
            source,
        })?;
        debug!(path = %path.display(), ?duration, "probed video duration");
        Ok(duration)
    }
}

#[derive(Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: Option<FormatSection>,
}

#[derive(Deserialize)]
struct FormatSection {
    #[serde(default, deserialize_with = "deserialize_seconds")]
    duration: Option<f64>,
}

/// Extract `format.duration` from an ffprobe JSON report.
///
/// An empty report is treated as `{}`. Negative durations clamp to zero.
pub fn parse_duration(report: &[u8]) -> Result<Option<f64>, serde_json::Error> {
    let text = String::from_utf8_lossy(report);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let report: ProbeReport = serde_json::from_str(trimmed)?;
    Ok(report
        .format
        .and_then(|format| format.duration)
        .filter(|seconds| seconds.is_finite())
        .map(|seconds| seconds.max(0.0)))
}

/// ffprobe prints durations as strings ("12.345000") but some builds emit
/// numbers; "N/A" and other junk map to `None`.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct Seconds;
    impl<'de> de::Visitor<'de> for Seconds {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a duration as string or number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.trim().parse::<f64>().ok())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Seconds)
}
