//! Video duration lookup, memoized per content identity

use crate::identity::ContentIdentity;
use crate::sidecar::SidecarMap;
use anyhow::Result;
use media_probe::DurationProbe;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// File name of the duration cache inside the metadata directory
pub const DURATION_CACHE_FILE: &str = "video_info.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationRecord {
    pub duration: f64,
}

/// Wraps a [`DurationProbe`] with a persistent identity-keyed cache.
///
/// Duration is a property of the bytes, so duplicate files share one probe.
/// Only successful probes are cached; "unknown" is retried on a later scan.
pub struct DurationProber {
    cache: Mutex<SidecarMap<DurationRecord>>,
    probe: Arc<dyn DurationProbe>,
    probes_run: AtomicU64,
    missing_reported: AtomicBool,
}

impl DurationProber {
    pub fn open(cache_path: &Path, probe: Arc<dyn DurationProbe>) -> Self {
        Self {
            cache: Mutex::new(SidecarMap::load(cache_path)),
            probe,
            probes_run: AtomicU64::new(0),
            missing_reported: AtomicBool::new(false),
        }
    }

    /// Duration in seconds, or `None` if it cannot be determined right now.
    /// Never fails: tool errors are logged and reported as unknown.
    pub fn duration(&self, identity: &ContentIdentity, path: &Path) -> Option<f64> {
        if let Some(record) = self.cache.lock().get(identity.as_str()) {
            return Some(record.duration);
        }

        self.probes_run.fetch_add(1, Ordering::Relaxed);
        match self.probe.probe_duration(path) {
            Ok(Some(duration)) => {
                self.cache
                    .lock()
                    .insert(identity.to_string(), DurationRecord { duration });
                Some(duration)
            }
            Ok(None) => {
                debug!(path = %path.display(), "probe report has no duration");
                None
            }
            Err(e) if e.is_not_installed() => {
                if !self.missing_reported.swap(true, Ordering::Relaxed) {
                    warn!(error = %e, "duration probe unavailable, durations will be unknown");
                }
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "duration probe failed");
                None
            }
        }
    }

    /// Persist the cache if any entry changed.
    pub fn flush(&self) -> Result<bool> {
        self.cache.lock().flush()
    }

    /// Number of times the underlying probe was invoked
    pub fn probes_run(&self) -> u64 {
        self.probes_run.load(Ordering::Relaxed)
    }
}
