//! Child process execution with a hard timeout
//!
//! The child is polled with `try_wait` until it exits or the deadline passes;
//! on timeout it is killed and reaped. Both output pipes are drained on
//! helper threads so a chatty tool cannot block on a full pipe buffer.

use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Why an external tool call did not produce a usable result
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{program} is not installed or not on PATH")]
    NotInstalled { program: String },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} reported success but wrote nothing to {}", dest.display())]
    NoOutput { program: String, dest: PathBuf },

    #[error("{program} produced an unreadable report: {source}")]
    MalformedReport {
        program: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    /// True when the binary itself could not be found
    pub fn is_not_installed(&self) -> bool {
        matches!(self, ToolError::NotInstalled { .. })
    }
}

/// Captured output of a successful run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run `program` with `args`, killing it if it outlives `timeout`.
///
/// A non-zero exit status is returned as [`ToolError::Failed`] with the
/// captured stderr.
pub fn run_with_timeout<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| spawn_error(program, source))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let waited = wait_until(&mut child, Instant::now() + timeout);
    let status = match waited {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            collect(stdout);
            collect(stderr);
            return Err(ToolError::TimedOut {
                program: program.to_string(),
                timeout,
            });
        }
        Err(source) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ToolError::Io {
                program: program.to_string(),
                source,
            });
        }
    };

    let output = ToolOutput {
        stdout: collect(stdout),
        stderr: collect(stderr),
    };

    if !status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

fn spawn_error(program: &str, source: io::Error) -> ToolError {
    if source.kind() == io::ErrorKind::NotFound {
        ToolError::NotInstalled {
            program: program.to_string(),
        }
    } else {
        ToolError::Io {
            program: program.to_string(),
            source,
        }
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout() {
        let output = run_with_timeout("sh", ["-c", "printf hello"], Duration::from_secs(5)).unwrap();
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let err = run_with_timeout("sh", ["-c", "echo broken >&2; exit 3"], Duration::from_secs(5))
            .unwrap_err();
        match err {
            ToolError::Failed { status, stderr, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_binary_is_not_installed() {
        let err = run_with_timeout(
            "definitely-not-a-real-tool-4f1c",
            ["--version"],
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.is_not_installed());
    }

    #[test]
    fn test_slow_tool_times_out() {
        let started = Instant::now();
        let err = run_with_timeout("sleep", ["5"], Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
