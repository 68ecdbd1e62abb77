//! Test doubles for the sandbox and generator seams.
//!
//! Both mocks are scripted ahead of time and record every call, so tests can
//! drive the pipeline deterministically without subprocesses or a model.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::{FixgateError, Result};
use crate::retry::{FixGenerator, FixRequest};
use crate::sandbox::{CommandSpec, InstallStatus, Sandbox, SandboxOutcome, SandboxStage};
use crate::snapshot::Snapshot;

// ============================================================================
// Outcome Builders
// ============================================================================

fn outcome(success: bool, stdout: &str, stderr: &str, exit_code: Option<i32>) -> SandboxOutcome {
    SandboxOutcome {
        success,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        exit_code,
        timed_out: false,
        stage: SandboxStage::Command,
        install: InstallStatus::NotNeeded,
        duration_ms: 1,
        summary: None,
    }
}

/// A command that exited 0 with `stdout`.
pub fn outcome_ok(stdout: &str) -> SandboxOutcome {
    outcome(true, stdout, "", Some(0))
}

/// A command that exited with `code` and `stderr`.
pub fn outcome_failed(code: i32, stderr: &str) -> SandboxOutcome {
    outcome(false, "", stderr, Some(code))
}

/// A command killed by the timeout.
pub fn outcome_timed_out() -> SandboxOutcome {
    SandboxOutcome {
        timed_out: true,
        ..outcome(false, "", "timed out after 1s", None)
    }
}

/// Dependency installation failed before the command ran.
pub fn outcome_install_failed(stderr: &str) -> SandboxOutcome {
    SandboxOutcome {
        stage: SandboxStage::Install,
        install: InstallStatus::Failed,
        ..outcome(false, "", stderr, Some(1))
    }
}

/// Dependency installation ran out of time.
pub fn outcome_install_timed_out() -> SandboxOutcome {
    SandboxOutcome {
        timed_out: true,
        ..outcome_install_failed("timed out after 1s")
    }
}

/// A successful command whose dependencies were not installed.
pub fn outcome_install_skipped(reason: &str) -> SandboxOutcome {
    SandboxOutcome {
        install: InstallStatus::Skipped {
            reason: reason.to_string(),
        },
        ..outcome_ok("")
    }
}

// ============================================================================
// Mock Sandbox
// ============================================================================

/// Scripted [`Sandbox`].
///
/// Returns queued outcomes in order, then `outcome_ok("")` once the queue is
/// empty.
///
/// # Example
///
/// ```rust
/// use fixgate::testing::{outcome_failed, MockSandbox};
///
/// let sandbox = MockSandbox::new().then(outcome_failed(1, "boom"));
/// assert!(sandbox.calls().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MockSandbox {
    outcomes: Mutex<VecDeque<SandboxOutcome>>,
    calls: Mutex<Vec<(CommandSpec, Snapshot)>>,
    error: Option<String>,
}

impl MockSandbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unscripted run.
    #[must_use]
    pub fn then(self, outcome: SandboxOutcome) -> Self {
        if let Ok(mut queue) = self.outcomes.lock() {
            queue.push_back(outcome);
        }
        self
    }

    /// Fail every run with a sandbox setup error.
    #[must_use]
    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    /// Every `(command, files)` pair the sandbox was asked to run.
    pub fn calls(&self) -> Vec<(CommandSpec, Snapshot)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn run(&self, files: &Snapshot, command: &CommandSpec) -> Result<SandboxOutcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((command.clone(), files.clone()));
        }
        if let Some(message) = &self.error {
            return Err(FixgateError::sandbox(message.clone()));
        }
        let next = self.outcomes.lock().ok().and_then(|mut q| q.pop_front());
        Ok(next.unwrap_or_else(|| outcome_ok("")))
    }
}

// ============================================================================
// Mock Fix Generator
// ============================================================================

/// Scripted [`FixGenerator`].
///
/// Each call consumes the next queued response or error. Running past the
/// script is a generator error.
#[derive(Debug, Default)]
pub struct MockFixGenerator {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<FixRequest>>,
    call_count: AtomicU32,
}

impl MockFixGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response.
    #[must_use]
    pub fn respond(self, response: impl Into<String>) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response.into()));
        }
        self
    }

    /// Queue a transport failure.
    #[must_use]
    pub fn fail(self, message: &str) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(message.to_string()));
        }
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<FixRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FixGenerator for MockFixGenerator {
    async fn generate(&self, request: &FixRequest) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match self.responses.lock().ok().and_then(|mut q| q.pop_front()) {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(FixgateError::generator(message)),
            None => Err(FixgateError::generator("mock generator has no more responses")),
        }
    }
}
