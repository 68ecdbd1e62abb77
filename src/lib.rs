//! fixgate - validation gate for machine-proposed code fixes
//!
//! Applies a structured fix to an in-memory snapshot of a project, checks the
//! result in stages and feeds failures back to the fix generator for a
//! bounded number of retries.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`fix`] - Fix payload parsing and exact-match patch application
//! - [`validate`] - Syntax, dependency, build and test validation
//! - [`sandbox`] - Isolated build/test execution in throwaway directories
//! - [`retry`] - The generate-validate-feedback loop
//! - [`snapshot`] - Loading and writing project snapshots
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Mocks and assertions for the collaborator seams
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fixgate::{CommandFixGenerator, CommandSpec, FixgateConfig, Orchestrator};
//!
//! # async fn run() -> fixgate::Result<()> {
//! let project = std::path::Path::new(".");
//! let config = FixgateConfig::load(project)?;
//! let snapshot = fixgate::snapshot::load_dir(project)?;
//!
//! let generator = CommandFixGenerator::new(CommandSpec::new("my-fix-bot"));
//! let orchestrator = Orchestrator::from_config(Arc::new(generator), &config);
//! let outcome = orchestrator.run("Pool exhausted under load", &snapshot, None).await?;
//! println!("{}", outcome.status());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fix;
pub mod language;
pub mod retry;
pub mod sandbox;
pub mod snapshot;
pub mod testing;
pub mod validate;

// Re-export commonly used types
pub use error::{FixgateError, Result};
pub use language::Language;

pub use config::{FeedbackConfig, FixgateConfig};

pub use fix::{apply, apply_fix, ApplyError, CandidateSet, ChangeOp, FileChange, FixSpec, NewFile};

pub use validate::{
    Aggregator, AggregatorOptions, CheckEntry, CheckKind, Manifest, ManifestKind, ValidationReport,
};

pub use sandbox::{CommandSpec, ProcessSandbox, Sandbox, SandboxConfig, SandboxOutcome};

pub use retry::{
    Attempt, CommandFixGenerator, FeedbackGenerator, FixGenerator, FixRequest, Orchestrator,
    RetrySession, SessionOutcome, SessionStatus, MAX_ATTEMPTS,
};

pub use snapshot::Snapshot;
