//! Timeout-bounded execution of external programs.
//!
//! The child's stdout and stderr are drained on helper threads so a chatty
//! program can never block on a full pipe while we poll for its exit.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default timeout for external tools.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Failure to run a program to completion.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Captured result of a finished program.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Short human-readable reason for a failed run.
    #[must_use]
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exited with {}", self.status)
        } else {
            stderr.to_owned()
        }
    }
}

/// Run `command` to completion, killing it once `timeout` elapses.
///
/// Stdin is closed; stdout and stderr are captured (lossy UTF-8).
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<ProcessOutput, ExecError> {
    let program = command.get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        program: program.clone(),
        source,
    })?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                tracing::warn!(program, timeout_secs = timeout.as_secs(), "killing timed out process");
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecError::Timeout { program, timeout });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                let _ = child.kill();
                return Err(ExecError::Wait { program, source });
            }
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output() {
        let output = run_with_timeout(
            Command::new("sh").args(["-c", "echo out; echo err >&2"]),
            Duration::from_secs(10),
        )
        .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn test_run_reports_failure_status() {
        let output = run_with_timeout(
            Command::new("sh").args(["-c", "echo broken >&2; exit 3"]),
            Duration::from_secs(10),
        )
        .unwrap();

        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.failure_message(), "broken");
    }

    #[test]
    fn test_run_times_out() {
        let started = Instant::now();
        let result = run_with_timeout(
            Command::new("sleep").arg("10"),
            Duration::from_millis(200),
        );

        assert!(matches!(result, Err(ExecError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_run_missing_program() {
        let result = run_with_timeout(
            &mut Command::new("oym-definitely-not-installed"),
            Duration::from_secs(1),
        );
        let err = result.unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
        assert!(err.to_string().starts_with("failed to start oym-definitely-not-installed"));
    }

    #[test]
    fn test_large_output_does_not_block() {
        let output = run_with_timeout(
            Command::new("sh").args(["-c", "head -c 1000000 /dev/zero | tr '\\0' 'a'"]),
            Duration::from_secs(10),
        )
        .unwrap();

        assert_eq!(output.stdout.len(), 1_000_000);
    }
}
