//! Validation report types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

// ============================================================================
// Check Entries
// ============================================================================

/// Pipeline stage that produced an entry.
///
/// The declaration order is the order entries for one file are listed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CheckKind {
    Patch,
    Syntax,
    Dependency,
    Install,
    Build,
    Test,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Patch => "Patch",
            Self::Syntax => "Syntax",
            Self::Dependency => "Dependency",
            Self::Install => "Install",
            Self::Build => "Build",
            Self::Test => "Test",
        };
        write!(f, "{}", name)
    }
}

/// One passed, failed or warning line in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckEntry {
    pub kind: CheckKind,
    /// File the entry is about. `None` for project-wide build/test entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
    /// Captured output excerpt or other supporting text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckEntry {
    /// Create a project-wide entry.
    pub fn new(kind: CheckKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            file: None,
            line: None,
            message: message.into(),
            detail: None,
        }
    }

    /// Create an entry about one file.
    pub fn for_file(kind: CheckKind, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::new(kind, message)
        }
    }

    /// Add a line number.
    #[must_use]
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Add supporting detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.trim().is_empty() {
            self.detail = Some(detail);
        }
        self
    }

    fn sort_key(&self) -> (bool, Option<&str>, CheckKind) {
        (self.file.is_none(), self.file.as_deref(), self.kind)
    }
}

impl fmt::Display for CheckEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.kind)?;
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: ", file, line)?,
            (Some(file), None) => write!(f, "{}: ", file)?,
            _ => {}
        }
        write!(f, "{}", self.message)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Counts over a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub duration_ms: u64,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passed, {} failed, {} warnings in {}ms",
            self.passed, self.failed, self.warnings, self.duration_ms
        )
    }
}

/// Outcome of validating one candidate fix.
///
/// A report passes iff `checks_failed` is empty. Warnings never fail it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checks_passed: Vec<CheckEntry>,
    pub checks_failed: Vec<CheckEntry>,
    pub warnings: Vec<CheckEntry>,
    pub summary: ReportSummary,
}

impl ValidationReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks_failed.is_empty()
    }

    /// Distinct stages with at least one failure, in stage order.
    pub fn failed_kinds(&self) -> BTreeSet<CheckKind> {
        self.checks_failed.iter().map(|e| e.kind).collect()
    }

    /// Failures produced by one stage.
    pub fn failures_of(&self, kind: CheckKind) -> impl Iterator<Item = &CheckEntry> {
        self.checks_failed.iter().filter(move |e| e.kind == kind)
    }

    pub fn has_failure(&self, kind: CheckKind) -> bool {
        self.failures_of(kind).next().is_some()
    }
}

/// Accumulates entries in any order and produces a deterministically
/// ordered [`ValidationReport`].
#[derive(Debug, Default)]
pub struct ReportBuilder {
    passed: Vec<CheckEntry>,
    failed: Vec<CheckEntry>,
    warnings: Vec<CheckEntry>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&mut self, entry: CheckEntry) {
        self.passed.push(entry);
    }

    pub fn fail(&mut self, entry: CheckEntry) {
        self.failed.push(entry);
    }

    pub fn warn(&mut self, entry: CheckEntry) {
        self.warnings.push(entry);
    }

    /// Whether any failure has been recorded so far.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn has_failure(&self, kind: CheckKind) -> bool {
        self.failed.iter().any(|e| e.kind == kind)
    }

    /// Sort and seal the report.
    ///
    /// Entries are ordered by file, then stage. Project-wide entries follow
    /// all file entries. Entries with equal keys keep insertion order.
    pub fn finish(mut self, duration: Duration) -> ValidationReport {
        for list in [&mut self.passed, &mut self.failed, &mut self.warnings] {
            list.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }

        let summary = ReportSummary {
            passed: self.passed.len(),
            failed: self.failed.len(),
            warnings: self.warnings.len(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        };

        ValidationReport {
            checks_passed: self.passed,
            checks_failed: self.failed,
            warnings: self.warnings,
            summary,
        }
    }
}
