//! Suite subprocess execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::stage::SuiteConfig;

/// Output kept per suite; older bytes are dropped.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Raw outcome of one suite process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteExecution {
    /// `None` when the process was killed or timed out.
    pub exit_code: Option<i32>,

    /// Stdout followed by stderr, tail-truncated.
    pub output: String,

    pub duration_ms: u64,

    pub timed_out: bool,
}

impl SuiteExecution {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Keep the last `max` bytes of `s`, cut on a char boundary.
pub fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

pub struct CiRunner;

impl CiRunner {
    /// Run one suite in `dir`.
    ///
    /// A timeout is not an error: the child is killed and the execution is
    /// returned with `timed_out` set. Spawn failures are errors.
    pub async fn execute_suite(config: &SuiteConfig, dir: &Path) -> anyhow::Result<SuiteExecution> {
        let start = Instant::now();

        let Some((exe, args)) = config.command.split_first() else {
            anyhow::bail!("suite {} has empty command", config.kind.name());
        };

        debug!(suite = config.kind.name(), command = ?config.command, "starting suite");
        let child = Command::new(exe)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = if config.timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(output) => output?,
                Err(_) => {
                    warn!(
                        suite = config.kind.name(),
                        timeout_secs = config.timeout_secs,
                        "suite timed out"
                    );
                    return Ok(SuiteExecution {
                        exit_code: None,
                        output: format!(
                            "{} timed out after {} seconds",
                            config.kind.name(),
                            config.timeout_secs
                        ),
                        duration_ms: start.elapsed().as_millis() as u64,
                        timed_out: true,
                    });
                }
            }
        } else {
            child.wait_with_output().await?
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(SuiteExecution {
            exit_code: output.status.code(),
            output: tail(&combined, MAX_OUTPUT_BYTES).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_core::SuiteKind;

    fn cmd(parts: &[&str], timeout_secs: u64) -> SuiteConfig {
        SuiteConfig::custom(
            SuiteKind::Unit,
            parts.iter().map(|p| p.to_string()).collect(),
            timeout_secs,
        )
    }

    #[test]
    fn test_tail_keeps_short_output() {
        assert_eq!(tail("hello", 10), "hello");
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let s = "ééé";
        assert_eq!(tail(s, 3), "é");
        assert_eq!(tail("abcdef", 2), "ef");
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let result = CiRunner::execute_suite(&cmd(&["echo", "hello"], 60), dir.path())
            .await
            .expect("execute failed");
        assert!(result.succeeded());
        assert!(result.output.contains("hello"));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let dir = tempfile::tempdir().unwrap();
        let result = CiRunner::execute_suite(&cmd(&["false"], 60), dir.path())
            .await
            .expect("execute failed");
        assert!(!result.succeeded());
        assert_eq!(result.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let result = CiRunner::execute_suite(&cmd(&["sh", "-c", "echo out; echo err >&2"], 60), dir.path())
            .await
            .unwrap();
        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = CiRunner::execute_suite(&cmd(&["sleep", "10"], 1), dir.path())
            .await
            .unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(result.duration_ms < 5_000);
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CiRunner::execute_suite(&cmd(&["remedy-no-such-binary"], 60), dir.path()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_command_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CiRunner::execute_suite(&cmd(&[], 60), dir.path()).await;
        assert!(result.is_err());
    }
}
