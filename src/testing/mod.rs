//! Test doubles and assertions for code built on fixgate.
//!
//! - **Mocks**: scripted [`Sandbox`](crate::sandbox::Sandbox) and
//!   [`FixGenerator`](crate::retry::FixGenerator) implementations
//! - **Assertions**: report checks with readable panic messages
//!
//! # Example
//!
//! ```rust
//! use fixgate::testing::{outcome_ok, MockFixGenerator, MockSandbox};
//!
//! let sandbox = MockSandbox::new().then(outcome_ok("built"));
//! let generator = MockFixGenerator::new().respond("{}").fail("offline");
//! assert_eq!(generator.call_count(), 0);
//! ```

pub mod assertions;
pub mod mocks;

pub use assertions::*;
pub use mocks::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{FixGenerator, FixRequest};
    use crate::sandbox::{CommandSpec, Sandbox};
    use crate::snapshot::Snapshot;
    use crate::validate::{CheckEntry, CheckKind, ValidationReport};

    #[tokio::test]
    async fn test_mock_sandbox_plays_script_then_succeeds() {
        let sandbox = MockSandbox::new()
            .then(outcome_failed(2, "bad"))
            .then(outcome_timed_out());
        let files = Snapshot::new();
        let cmd = CommandSpec::new("build");

        let first = sandbox.run(&files, &cmd).await.unwrap();
        assert_eq!(first.exit_code, Some(2));
        assert!(sandbox.run(&files, &cmd).await.unwrap().timed_out);
        assert!(sandbox.run(&files, &cmd).await.unwrap().success);
        assert_eq!(sandbox.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_sandbox_error() {
        let sandbox = MockSandbox::new().with_error("disk full");
        let err = sandbox
            .run(&Snapshot::new(), &CommandSpec::new("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_install_failed_outcome() {
        let outcome = outcome_install_failed("E404");
        assert!(outcome.failed_at_install());
    }

    #[tokio::test]
    async fn test_mock_generator_script() {
        let generator = MockFixGenerator::new().respond("a").fail("offline");
        let request = FixRequest::initial("issue", 3);

        assert_eq!(generator.generate(&request).await.unwrap(), "a");
        assert!(generator.generate(&request).await.is_err());
        assert!(generator.generate(&request).await.is_err());
        assert_eq!(generator.call_count(), 3);
        assert_eq!(generator.requests().len(), 3);
    }

    #[test]
    fn test_report_assertions() {
        let report = ValidationReport {
            checks_failed: vec![CheckEntry::for_file(CheckKind::Syntax, "a.js", "unexpected `)`")],
            warnings: vec![CheckEntry::new(CheckKind::Test, "no test command detected")],
            ..Default::default()
        };
        assert_failed_with(&report, CheckKind::Syntax);
        assert_failure_contains(&report, "a.js: unexpected");
        assert_warning_contains(&report, "no test command");
        assert_report_passed(&ValidationReport::default());
    }

    #[test]
    #[should_panic(expected = "Expected a Build failure")]
    fn test_assert_failed_with_panics() {
        assert_failed_with(&ValidationReport::default(), CheckKind::Build);
    }
}
