//! Multi-stage validation of candidate fixes.
//!
//! - [`syntax`] - tree-sitter parse checks per file
//! - [`deps`] - declared-dependency checks per file
//! - [`aggregator`] - runs every stage and builds the [`ValidationReport`]
//! - [`report`] - report and entry types

pub mod aggregator;
pub mod deps;
pub mod report;
pub mod syntax;

pub use aggregator::{Aggregator, AggregatorOptions};
pub use deps::{DependencyCheck, DependencyChecker, Manifest, ManifestError, ManifestKind};
pub use report::{CheckEntry, CheckKind, ReportBuilder, ReportSummary, ValidationReport};
pub use syntax::{SyntaxCheck, SyntaxError, SyntaxResult, SyntaxValidator};
