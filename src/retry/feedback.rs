//! Structured feedback sent back to the fix generator after a failed attempt.
//!
//! # Example
//!
//! ```rust
//! use fixgate::retry::feedback::FeedbackGenerator;
//! use fixgate::validate::{CheckEntry, CheckKind, ValidationReport};
//!
//! let report = ValidationReport {
//!     checks_failed: vec![CheckEntry::for_file(CheckKind::Syntax, "app.js", "unexpected `}`").with_line(4)],
//!     ..Default::default()
//! };
//! let text = FeedbackGenerator::new().generate(&report, 1, 3, false);
//! assert!(text.starts_with("# Validation Failed - Attempt 1 of 3"));
//! assert!(text.contains("1. [Syntax] app.js:4: unexpected `}`"));
//! ```

use crate::config::FeedbackConfig;
use crate::validate::{CheckEntry, CheckKind, ValidationReport};

/// Appended when the generator returned the same fix as last time.
pub const REPEATED_FIX_NOTE: &str =
    "Note: this fix is identical to the previous attempt. Try a different approach.";

const CLOSING: &str = "Return a complete revised fix in the same JSON format. Every old_code must\n\
                       match the current file content exactly once.\n";

/// Detail lines kept per entry.
const MAX_DETAIL_LINES: usize = 40;

// ============================================================================
// Feedback Generator
// ============================================================================

/// Turns a failed [`ValidationReport`] into text for the next generation.
#[derive(Debug, Clone, Default)]
pub struct FeedbackGenerator {
    config: FeedbackConfig,
}

impl FeedbackGenerator {
    /// Create a generator with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator with custom configuration.
    #[must_use]
    pub fn with_config(config: FeedbackConfig) -> Self {
        Self { config }
    }

    /// Render feedback for attempt `attempt` of `max_attempts`.
    ///
    /// Returns an empty string for a passing report.
    #[must_use]
    pub fn generate(
        &self,
        report: &ValidationReport,
        attempt: u32,
        max_attempts: u32,
        repeated: bool,
    ) -> String {
        if report.passed() {
            return String::new();
        }

        let mut text = String::new();
        text.push_str(&format!(
            "# Validation Failed - Attempt {} of {}\n\n",
            attempt, max_attempts
        ));
        text.push_str("The proposed fix did not pass validation. Failed checks:\n\n");

        let limit = self.config.max_entries.max(1);
        for (i, entry) in report.checks_failed.iter().take(limit).enumerate() {
            text.push_str(&format_entry(i + 1, entry));
        }
        if report.checks_failed.len() > limit {
            text.push_str(&format!(
                "\n... and {} more failed checks.\n",
                report.checks_failed.len() - limit
            ));
        }

        text.push_str("\n## How to Fix\n");
        for kind in report.failed_kinds() {
            text.push_str(&format!("- {}\n", guidance(kind)));
        }

        if repeated {
            text.push('\n');
            text.push_str(REPEATED_FIX_NOTE);
            text.push('\n');
        }

        text.push('\n');
        text.push_str(CLOSING);
        text
    }
}

fn format_entry(number: usize, entry: &CheckEntry) -> String {
    let mut line = format!("{}. {}\n", number, entry);
    if let Some(detail) = &entry.detail {
        let lines: Vec<&str> = detail.lines().collect();
        let skip = lines.len().saturating_sub(MAX_DETAIL_LINES);
        line.push_str("   ```\n");
        for l in &lines[skip..] {
            line.push_str("   ");
            line.push_str(l);
            line.push('\n');
        }
        line.push_str("   ```\n");
    }
    line
}

/// Fix guidance for one failed category.
pub fn guidance(kind: CheckKind) -> &'static str {
    match kind {
        CheckKind::Patch => "Patch location errors: copy old_code verbatim from the current file content and include enough surrounding lines to make it unique.",
        CheckKind::Syntax => "Syntax errors: fix the syntax errors at the given lines so every file parses.",
        CheckKind::Dependency => "Missing dependencies: add each missing dependency to the manifest or remove the import.",
        CheckKind::Install => "Dependency installation failed: check manifest entries for typos and unavailable versions.",
        CheckKind::Build => "Build failures: resolve the build errors shown in the captured output.",
        CheckKind::Test => "Test failures: make the failing tests pass without weakening or deleting them.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing(entries: Vec<CheckEntry>) -> ValidationReport {
        ValidationReport {
            checks_failed: entries,
            ..Default::default()
        }
    }

    #[test]
    fn test_passing_report_has_no_feedback() {
        let text = FeedbackGenerator::new().generate(&ValidationReport::default(), 1, 3, false);
        assert!(text.is_empty());
    }

    #[test]
    fn test_exact_layout() {
        let report = failing(vec![
            CheckEntry::for_file(CheckKind::Patch, "app.js", "change 1: old_code not found"),
            CheckEntry::for_file(CheckKind::Dependency, "app.js", "missing dependency `left-pad`"),
        ]);
        let text = FeedbackGenerator::new().generate(&report, 2, 3, false);

        let expected = "# Validation Failed - Attempt 2 of 3\n\
\n\
The proposed fix did not pass validation. Failed checks:\n\
\n\
1. [Patch] app.js: change 1: old_code not found\n\
2. [Dependency] app.js: missing dependency `left-pad`\n\
\n\
## How to Fix\n\
- Patch location errors: copy old_code verbatim from the current file content and include enough surrounding lines to make it unique.\n\
- Missing dependencies: add each missing dependency to the manifest or remove the import.\n\
\n\
Return a complete revised fix in the same JSON format. Every old_code must\n\
match the current file content exactly once.\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_guidance_once_per_kind() {
        let report = failing(vec![
            CheckEntry::for_file(CheckKind::Syntax, "a.js", "x").with_line(1),
            CheckEntry::for_file(CheckKind::Syntax, "b.js", "y").with_line(2),
        ]);
        let text = FeedbackGenerator::new().generate(&report, 1, 3, false);
        assert_eq!(text.matches("Syntax errors:").count(), 1);
    }

    #[test]
    fn test_detail_is_indented_tail() {
        let detail: String = (1..=50).map(|i| format!("line {}\n", i)).collect();
        let report = failing(vec![
            CheckEntry::new(CheckKind::Build, "`npm run build` exited with code 1").with_detail(detail),
        ]);
        let text = FeedbackGenerator::new().generate(&report, 1, 3, false);
        assert!(text.contains("   line 50\n"));
        assert!(text.contains("   line 11\n"));
        assert!(!text.contains("   line 10\n"));
        assert!(text.contains(guidance(CheckKind::Build)));
    }

    #[test]
    fn test_entries_beyond_limit_summarized() {
        let entries = (0..5)
            .map(|i| CheckEntry::for_file(CheckKind::Syntax, format!("f{}.js", i), "bad"))
            .collect();
        let generator = FeedbackGenerator::with_config(FeedbackConfig { max_entries: 2 });
        let text = generator.generate(&failing(entries), 1, 3, false);
        assert!(text.contains("2. [Syntax] f1.js: bad"));
        assert!(!text.contains("f2.js"));
        assert!(text.contains("... and 3 more failed checks."));
    }

    #[test]
    fn test_repeated_note() {
        let report = failing(vec![CheckEntry::new(CheckKind::Test, "`npm test` exited with code 1")]);
        let text = FeedbackGenerator::new().generate(&report, 2, 3, true);
        assert!(text.contains(REPEATED_FIX_NOTE));
        assert!(text.ends_with(CLOSING));
    }
}
