//! The fix-generation collaborator seam.
//!
//! The orchestrator never talks to a model directly. It hands a
//! [`FixRequest`] to a [`FixGenerator`] and gets back the raw response text,
//! which it parses into a [`FixSpec`](crate::fix::FixSpec) itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{FixgateError, Result};
use crate::fix::FixSpec;
use crate::sandbox::CommandSpec;

/// What the generator is asked for on one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixRequest {
    /// Issue description and any code context the caller supplied.
    pub issue_context: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Structured feedback from the previous failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// The fix that produced `feedback`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<FixSpec>,
}

impl FixRequest {
    /// The first request of a session.
    pub fn initial(issue_context: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            issue_context: issue_context.into(),
            attempt: 1,
            max_attempts,
            feedback: None,
            previous: None,
        }
    }

    /// A follow-up request carrying feedback on `previous`.
    #[must_use]
    pub fn retry(&self, feedback: String, previous: FixSpec) -> Self {
        Self {
            issue_context: self.issue_context.clone(),
            attempt: self.attempt + 1,
            max_attempts: self.max_attempts,
            feedback: Some(feedback),
            previous: Some(previous),
        }
    }

    /// Whether this is a retry.
    pub fn is_retry(&self) -> bool {
        self.feedback.is_some()
    }
}

/// Produces candidate fixes.
///
/// Implementations return the raw response; it may wrap the fix JSON in a
/// markdown fence or prose.
///
/// # Errors
///
/// Transport failures return [`FixgateError::Generator`]. They abort the
/// session.
#[async_trait]
pub trait FixGenerator: Send + Sync {
    async fn generate(&self, request: &FixRequest) -> Result<String>;
}

/// [`FixGenerator`] backed by an external program.
///
/// The request is written to the program's stdin as JSON; its stdout is the
/// response.
#[derive(Debug, Clone)]
pub struct CommandFixGenerator {
    command: CommandSpec,
    working_dir: PathBuf,
}

impl CommandFixGenerator {
    #[must_use]
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            working_dir: PathBuf::from("."),
        }
    }

    /// Run the program from `dir`.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

#[async_trait]
impl FixGenerator for CommandFixGenerator {
    async fn generate(&self, request: &FixRequest) -> Result<String> {
        let payload = serde_json::to_vec(request)?;

        debug!(
            command = %self.command,
            attempt = request.attempt,
            retry = request.is_retry(),
            bytes = payload.len(),
            "Requesting fix"
        );

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .envs(&self.command.env)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                FixgateError::generator(format!("failed to start `{}`: {}", self.command.program, e))
            })?;

        let stdin = child.stdin.take();
        let send = async {
            let Some(mut stdin) = stdin else { return Ok(()) };
            let written = match stdin.write_all(&payload).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            match written {
                // The program does not read its input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(command = %self.command, "Generator closed stdin early");
                    Ok(())
                }
                other => other,
            }
        };

        // One deadline covers both the write and the wait.
        let exchange = async {
            let (sent, output) = tokio::join!(send, child.wait_with_output());
            sent.map_err(|e| FixgateError::generator(format!("failed to send request: {}", e)))?;
            Ok::<_, FixgateError>(output?)
        };

        let output = tokio::time::timeout(self.command.timeout, exchange)
            .await
            .map_err(|_| {
                FixgateError::generator(format!(
                    "`{}` timed out after {}s",
                    self.command,
                    self.command.timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FixgateError::generator(format!(
                "`{}` exited with code {}: {}",
                self.command,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_request_chain() {
        let first = FixRequest::initial("pool exhausted", 3);
        assert_eq!(first.attempt, 1);
        assert!(!first.is_retry());

        let second = first.retry("fix it".to_string(), FixSpec::new());
        assert_eq!(second.attempt, 2);
        assert_eq!(second.issue_context, "pool exhausted");
        assert!(second.is_retry());
    }

    #[test]
    fn test_request_json_omits_empty_feedback() {
        let json = serde_json::to_value(FixRequest::initial("x", 3)).unwrap();
        assert!(json.get("feedback").is_none());
        assert_eq!(json["attempt"], 1);
        assert_eq!(json["max_attempts"], 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_generator_reads_stdout() {
        // `cat` echoes the request back, proving it arrived on stdin.
        let generator = CommandFixGenerator::new(CommandSpec::new("cat"));
        let response = generator
            .generate(&FixRequest::initial("echo me", 3))
            .await
            .unwrap();
        let echoed: FixRequest = serde_json::from_str(&response).unwrap();
        assert_eq!(echoed.issue_context, "echo me");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_generator_nonzero_exit() {
        let generator = CommandFixGenerator::new(CommandSpec::new("sh").args(["-c", "cat >/dev/null; echo boom >&2; exit 2"]));
        let err = generator
            .generate(&FixRequest::initial("x", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, FixgateError::Generator { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_generator_timeout() {
        let generator = CommandFixGenerator::new(
            CommandSpec::new("sleep")
                .arg("5")
                .with_timeout(Duration::from_millis(200)),
        );
        let err = generator
            .generate(&FixRequest::initial("x", 3))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_generator_timeout_with_unread_large_request() {
        // Far beyond a pipe buffer, and `sleep` never reads it.
        let request = FixRequest::initial("x".repeat(512 * 1024), 3);
        let generator = CommandFixGenerator::new(
            CommandSpec::new("sleep")
                .arg("6")
                .with_timeout(Duration::from_millis(200)),
        );

        let started = std::time::Instant::now();
        let err = generator.generate(&request).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(err, FixgateError::Generator { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_command_generator_missing_program() {
        let generator = CommandFixGenerator::new(CommandSpec::new("fixgate-no-such-generator"));
        let err = generator
            .generate(&FixRequest::initial("x", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, FixgateError::Generator { .. }));
    }
}
