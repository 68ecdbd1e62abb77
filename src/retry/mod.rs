//! Bounded generate-validate-feedback loop.
//!
//! ```text
//! Generating ──> Validating ──┬──> Succeeded            (no failed checks)
//!     ▲                       ├──> FixNeeded ──┐        (attempts < max)
//!     └───────────────────────┼────────────────┘
//!                             └──> Exhausted            (attempts == max)
//! ```
//!
//! One attempt is one fix received from the generator and validated. A
//! session never makes more than [`MAX_ATTEMPTS`] attempts.

pub mod feedback;
pub mod generator;

pub use feedback::{FeedbackGenerator, REPEATED_FIX_NOTE};
pub use generator::{CommandFixGenerator, FixGenerator, FixRequest};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FixgateConfig;
use crate::error::Result;
use crate::fix::FixSpec;
use crate::snapshot::Snapshot;
use crate::validate::{Aggregator, Manifest, ValidationReport};

/// Attempts per session.
pub const MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorState {
    Generating,
    Validating,
    FixNeeded,
    Succeeded,
    Exhausted,
}

impl OrchestratorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }
}

/// State after validating attempt number `attempts`.
///
/// # Example
///
/// ```rust
/// use fixgate::retry::{next_state, OrchestratorState, MAX_ATTEMPTS};
///
/// assert_eq!(next_state(false, 1, MAX_ATTEMPTS), OrchestratorState::FixNeeded);
/// assert_eq!(next_state(false, 3, MAX_ATTEMPTS), OrchestratorState::Exhausted);
/// assert_eq!(next_state(true, 3, MAX_ATTEMPTS), OrchestratorState::Succeeded);
/// ```
pub fn next_state(passed: bool, attempts: u32, max_attempts: u32) -> OrchestratorState {
    if passed {
        OrchestratorState::Succeeded
    } else if attempts >= max_attempts {
        OrchestratorState::Exhausted
    } else {
        OrchestratorState::FixNeeded
    }
}

// ============================================================================
// Session Records
// ============================================================================

/// One validated fix. Never modified after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub number: u32,
    pub fix_spec: FixSpec,
    pub validation_report: ValidationReport,
    pub fix_digest: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    InProgress,
    Succeeded,
    Exhausted,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InProgress => "in progress",
            Self::Succeeded => "succeeded",
            Self::Exhausted => "exhausted",
        };
        write!(f, "{}", s)
    }
}

/// The attempt history of one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySession {
    session_id: Uuid,
    attempts: Vec<Attempt>,
    max_attempts: u32,
    status: SessionStatus,
}

impl Default for RetrySession {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrySession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            attempts: Vec::new(),
            max_attempts: MAX_ATTEMPTS,
            status: SessionStatus::InProgress,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Append `attempt` and move to the resulting state.
    fn record(&mut self, attempt: Attempt) -> OrchestratorState {
        let passed = attempt.validation_report.passed();
        self.attempts.push(attempt);
        let state = next_state(passed, self.attempts.len() as u32, self.max_attempts);
        self.status = match state {
            OrchestratorState::Succeeded => SessionStatus::Succeeded,
            OrchestratorState::Exhausted => SessionStatus::Exhausted,
            _ => SessionStatus::InProgress,
        };
        state
    }
}

/// How a finished session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session: RetrySession,
    /// Set when every attempt failed and a human has to take over.
    pub manual_review_required: bool,
    /// The fix that passed validation.
    pub final_fix: Option<FixSpec>,
}

impl SessionOutcome {
    /// Summarize `session`. An unfinished session has no final fix and does
    /// not yet require manual review.
    pub fn from_session(session: RetrySession) -> Self {
        let manual_review_required = session.status == SessionStatus::Exhausted;
        let final_fix = match session.status {
            SessionStatus::Succeeded => session.last_attempt().map(|a| a.fix_spec.clone()),
            _ => None,
        };
        Self {
            session,
            manual_review_required,
            final_fix,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.session.status == SessionStatus::Succeeded
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn attempts(&self) -> &[Attempt] {
        self.session.attempts()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives one [`RetrySession`] per call to [`run`](Orchestrator::run).
///
/// Sessions share nothing mutable, so one orchestrator can run several
/// concurrently.
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn FixGenerator>,
    aggregator: Aggregator,
    feedback: FeedbackGenerator,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn FixGenerator>, aggregator: Aggregator) -> Self {
        Self {
            generator,
            aggregator,
            feedback: FeedbackGenerator::new(),
        }
    }

    /// Production validation pipeline configured from `config`.
    pub fn from_config(generator: Arc<dyn FixGenerator>, config: &FixgateConfig) -> Self {
        Self::new(generator, Aggregator::from_config(config))
            .with_feedback(FeedbackGenerator::with_config(config.feedback.clone()))
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: FeedbackGenerator) -> Self {
        self.feedback = feedback;
        self
    }

    /// Run a session for one issue until it succeeds or is exhausted.
    ///
    /// # Errors
    ///
    /// - [`FixgateError::Generator`](crate::FixgateError::Generator) if the
    ///   generator fails.
    /// - [`FixgateError::MalformedFix`](crate::FixgateError::MalformedFix) if
    ///   a response is not a valid fix. No attempt is recorded for it.
    ///
    /// Use [`run_in`](Orchestrator::run_in) to keep the attempts made before
    /// an error.
    pub async fn run(
        &self,
        issue_context: &str,
        snapshot: &Snapshot,
        manifest: Option<&Manifest>,
    ) -> Result<SessionOutcome> {
        let mut session = RetrySession::new();
        self.run_in(&mut session, issue_context, snapshot, manifest)
            .await?;
        Ok(SessionOutcome::from_session(session))
    }

    /// Like [`run`](Orchestrator::run), recording attempts into a new,
    /// caller-owned `session`. On error the session keeps every attempt
    /// validated so far and stays [`SessionStatus::InProgress`].
    pub async fn run_in(
        &self,
        session: &mut RetrySession,
        issue_context: &str,
        snapshot: &Snapshot,
        manifest: Option<&Manifest>,
    ) -> Result<()> {
        let mut request = FixRequest::initial(issue_context, session.max_attempts);

        info!(
            session_id = %session.session_id,
            max_attempts = session.max_attempts,
            files = snapshot.len(),
            "Starting fix session"
        );

        loop {
            let started_at = Utc::now();
            debug!(state = ?OrchestratorState::Generating, attempt = request.attempt);

            let response = self.generator.generate(&request).await?;
            let fix = FixSpec::parse_response(&response).inspect_err(|e| {
                warn!(attempt = request.attempt, error = %e, "Generator returned a malformed fix");
            })?;

            debug!(
                state = ?OrchestratorState::Validating,
                attempt = request.attempt,
                changes = fix.change_count()
            );
            let report = self.aggregator.evaluate(&fix, snapshot, manifest).await;

            let fix_digest = fix.digest();
            let repeated = session
                .last_attempt()
                .is_some_and(|prev| prev.fix_digest == fix_digest);

            let number = session.attempts.len() as u32 + 1;
            let state = session.record(Attempt {
                number,
                fix_spec: fix,
                validation_report: report,
                fix_digest,
                started_at,
            });

            let Some(last) = session.last_attempt() else {
                break;
            };
            info!(
                attempt = last.number,
                state = ?state,
                failed = last.validation_report.summary.failed,
                "Attempt validated"
            );

            if state.is_terminal() {
                break;
            }

            if repeated {
                warn!(attempt = last.number, "Generator repeated the previous fix");
            }
            let feedback =
                self.feedback
                    .generate(&last.validation_report, last.number, session.max_attempts, repeated);
            request = request.retry(feedback, last.fix_spec.clone());
        }

        match session.status {
            SessionStatus::Succeeded => info!(
                session_id = %session.session_id,
                attempts = session.attempts.len(),
                "Fix session succeeded"
            ),
            _ => warn!(
                session_id = %session.session_id,
                attempts = session.attempts.len(),
                "Fix session exhausted, manual review required"
            ),
        }

        Ok(())
    }
}
