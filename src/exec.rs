//! Bounded external-process execution.
//!
//! OCR, page rasterization, and the external converter all shell out to
//! tools that can hang on hostile input. Every invocation goes through
//! [`run_with_timeout`]: piped streams are drained on reader threads while
//! the child is polled against a wall-clock deadline, and the process is
//! killed when the deadline passes.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Captured outcome of a bounded process run.
#[derive(Debug)]
pub struct ExecOutput {
    /// Exit code, if the process exited normally
    pub status_code: Option<i32>,

    /// Whether the process exited with code 0
    pub success: bool,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// How often the child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run a command to completion under a wall-clock deadline.
///
/// Returns [`Error::ExternalToolTimeout`] after killing the child when the
/// deadline passes. A non-zero exit is not an error here; callers inspect
/// `success` and the captured streams.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<ExecOutput> {
    let tool = tool_name(&command);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let started = Instant::now();
    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ExternalToolUnavailable { tool: tool.clone() }
        } else {
            Error::Io(e)
        }
    })?;

    let stdout_handle = drain(child.stdout.take());
    let stderr_handle = drain(child.stderr.take());

    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if started.elapsed() >= timeout {
                    kill_child(&mut child, &tool);
                    // Join the drains so the pipes close cleanly.
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(Error::ExternalToolTimeout {
                        tool,
                        seconds: timeout.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    Ok(ExecOutput {
        status_code: status.code(),
        success: status.success(),
        stdout,
        stderr,
        duration: started.elapsed(),
    })
}

/// Probe a tool by running it with the given arguments (typically
/// `--version`) under a short timeout. Returns the first output line on
/// success.
pub fn probe_tool(tool: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut command = Command::new(tool);
    command.args(args);
    match run_with_timeout(command, timeout) {
        Ok(output) if output.success => {
            let line = output
                .stdout
                .lines()
                .chain(output.stderr.lines())
                .find(|l| !l.trim().is_empty())
                .unwrap_or_default()
                .trim()
                .to_string();
            Some(line)
        }
        Ok(_) => None,
        Err(e) => {
            log::debug!("probe of {} failed: {}", tool, e);
            None
        }
    }
}

fn tool_name(command: &Command) -> String {
    command.get_program().to_string_lossy().to_string()
}

fn kill_child(child: &mut Child, tool: &str) {
    log::warn!("killing {} after timeout", tool);
    if let Err(e) = child.kill() {
        log::warn!("failed to kill {}: {}", tool, e);
    }
    let _ = child.wait();
}

/// Drain a pipe on a background thread, returning its contents on join.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let mut command = Command::new("echo");
        command.arg("hello");
        let output = run_with_timeout(command, Duration::from_secs(5)).unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_nonzero_exit_is_not_error() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo oops >&2; exit 3"]);
        let output = run_with_timeout(command, Duration::from_secs(5)).unwrap();
        assert!(!output.success);
        assert_eq!(output.status_code, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_timeout_kills_process() {
        let mut command = Command::new("sleep");
        command.arg("30");
        let err = run_with_timeout(command, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, Error::ExternalToolTimeout { .. }));
    }

    #[test]
    fn test_missing_tool() {
        let command = Command::new("definitely-not-a-real-tool-xyz");
        let err = run_with_timeout(command, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::ExternalToolUnavailable { .. }));
    }

    #[test]
    fn test_probe_tool() {
        assert!(probe_tool("sh", &["-c", "echo ok"], Duration::from_secs(5)).is_some());
        assert!(probe_tool("definitely-not-a-real-tool-xyz", &["--version"], Duration::from_secs(1)).is_none());
    }
}
