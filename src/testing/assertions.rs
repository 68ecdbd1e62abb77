//! Assertions over [`ValidationReport`]s.

use crate::validate::{CheckKind, ValidationReport};

/// Assert that a report passed.
///
/// # Panics
///
/// Panics listing the failed checks if it did not.
pub fn assert_report_passed(report: &ValidationReport) {
    assert!(
        report.passed(),
        "Expected validation to pass, but it failed.\nFailures: {:#?}",
        report.checks_failed
    );
}

/// Assert that a report failed in `kind`.
///
/// # Panics
///
/// Panics if there is no failed check of that kind.
pub fn assert_failed_with(report: &ValidationReport, kind: CheckKind) {
    assert!(
        report.has_failure(kind),
        "Expected a {} failure.\nFailures: {:#?}",
        kind,
        report.checks_failed
    );
}

/// Assert that some failed check renders with `substring`.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_failure_contains(report: &ValidationReport, substring: &str) {
    let found = report
        .checks_failed
        .iter()
        .any(|e| e.to_string().contains(substring));
    assert!(
        found,
        "Expected a failure containing '{}', but none found.\nFailures: {:#?}",
        substring,
        report.checks_failed
    );
}

/// Assert that some warning renders with `substring`.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_warning_contains(report: &ValidationReport, substring: &str) {
    let found = report
        .warnings
        .iter()
        .any(|e| e.to_string().contains(substring));
    assert!(
        found,
        "Expected a warning containing '{}', but none found.\nWarnings: {:#?}",
        substring,
        report.warnings
    );
}
