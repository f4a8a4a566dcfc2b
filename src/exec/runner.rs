//! Process runner.
//!
//! Spawns one external command through a shell, enforces a timeout, captures
//! stdout/stderr, and normalizes the result into an `ExecutionOutcome`.
//!
//! Commands go through `sh -c` so the fixed templates in the route tables
//! may use pipes and redirection. That makes any untrusted input reaching a
//! template a command-injection vector: dynamic values must either pass the
//! allow-list filters in [`crate::exec::sanitize`] or travel over the stdin
//! side channel in [`RunOptions`], never be concatenated into the template.

use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Default timeout for command execution.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ceiling for per-descriptor timeout overrides. Slow hardware scans may
/// need more than the default, but nothing should hold a request longer
/// than this.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors that prevent an outcome from being produced at all.
///
/// A command that runs and fails is not an error here; that is a normal
/// `ExecutionOutcome` with `success = false`.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn command: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error while running command: {0}")]
    Io(#[from] std::io::Error),

    #[error("command runner is shutting down")]
    Unavailable,
}

/// Normalized result of one command execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    /// True only when the process exited with status zero.
    pub success: bool,

    /// Exit code, `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,

    /// Captured stdout, trailing whitespace trimmed.
    pub stdout: String,

    /// Captured stderr, trailing whitespace trimmed. stderr content alone
    /// does not imply failure.
    pub stderr: String,

    /// True when the process exceeded its timeout and was killed.
    pub timed_out: bool,
}

impl ExecutionOutcome {
    fn from_output(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout)
                .trim_end()
                .to_string(),
            stderr: String::from_utf8_lossy(&output.stderr)
                .trim_end()
                .to_string(),
            timed_out: false,
        }
    }

    fn timeout() -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        }
    }
}

/// Options for one invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Timeout override; `None` uses [`DEFAULT_TIMEOUT`]. Clamped to
    /// [`MAX_TIMEOUT`].
    pub timeout: Option<Duration>,

    /// Payload written to the child's stdin, then closed. The side channel
    /// for untrusted data that must reach a command.
    pub stdin: Option<String>,
}

/// Spawns commands and normalizes their outcomes.
///
/// Holds the optional concurrency bound; cheap to clone via `Arc`.
pub struct CommandRunner {
    limiter: Option<Arc<Semaphore>>,
}

impl CommandRunner {
    /// Create a runner. `max_concurrent` bounds simultaneously running
    /// commands; 0 leaves spawning unbounded.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            limiter: (max_concurrent > 0).then(|| Arc::new(Semaphore::new(max_concurrent))),
        }
    }

    /// Run `command` through `sh -c` and wait for it to finish.
    ///
    /// On timeout the child is forcibly killed (it is spawned with
    /// `kill_on_drop`, and dropping the wait future on expiry drops the
    /// child handle) and the outcome reports `timed_out = true`.
    pub async fn run(&self, command: &str, opts: RunOptions) -> Result<ExecutionOutcome, ExecError> {
        let _permit = match &self.limiter {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| ExecError::Unavailable)?,
            ),
            None => None,
        };

        let timeout = opts
            .timeout
            .unwrap_or(DEFAULT_TIMEOUT)
            .min(MAX_TIMEOUT);

        info!(command, timeout_ms = timeout.as_millis() as u64, "command about to run");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(if opts.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn { source })?;

        if let Some(payload) = &opts.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(payload.as_bytes()).await?;
                // Dropping stdin closes the pipe and signals EOF.
            }
        }

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => Ok(ExecutionOutcome::from_output(result?)),
            Err(_) => {
                warn!(command, "command timed out, killing child");
                Ok(ExecutionOutcome::timeout())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_run_echo() {
        let runner = CommandRunner::new(0);
        let outcome = runner
            .run("echo hello world", RunOptions::default())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout, "hello world");
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let runner = CommandRunner::new(0);
        let outcome = runner.run("exit 3", RunOptions::default()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_stderr_alone_is_not_failure() {
        let runner = CommandRunner::new(0);
        let outcome = runner
            .run("echo warning >&2", RunOptions::default())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.stderr, "warning");
        assert!(outcome.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_pipes_work_through_the_shell() {
        let runner = CommandRunner::new(0);
        let outcome = runner
            .run("printf 'a\\nb\\nc\\n' | wc -l", RunOptions::default())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.stdout.trim(), "3");
    }

    #[tokio::test]
    async fn test_trailing_whitespace_trimmed() {
        let runner = CommandRunner::new(0);
        let outcome = runner
            .run("printf 'value\\n\\n'", RunOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "value");
    }

    #[tokio::test]
    async fn test_timeout_kills_and_returns_promptly() {
        let runner = CommandRunner::new(0);
        let start = Instant::now();
        let outcome = runner
            .run(
                "sleep 30",
                RunOptions {
                    timeout: Some(Duration::from_millis(200)),
                    stdin: None,
                },
            )
            .await
            .unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success);
        assert!(outcome.exit_code.is_none());
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "timeout did not return promptly: {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_stdin_side_channel() {
        let runner = CommandRunner::new(0);
        let outcome = runner
            .run(
                "cat",
                RunOptions {
                    timeout: None,
                    stdin: Some("9000 4500 560".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.stdout, "9000 4500 560");
    }

    #[tokio::test]
    async fn test_timeout_clamped_to_ceiling() {
        // A request asking for an hour still gets at most MAX_TIMEOUT; the
        // command itself finishes instantly so this just exercises the path.
        let runner = CommandRunner::new(0);
        let outcome = runner
            .run(
                "true",
                RunOptions {
                    timeout: Some(Duration::from_secs(3600)),
                    stdin: None,
                },
            )
            .await
            .unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_bounded_runner_still_executes() {
        let runner = CommandRunner::new(2);
        let outcome = runner.run("echo bounded", RunOptions::default()).await.unwrap();
        assert_eq!(outcome.stdout, "bounded");
    }
}
