//! Verbatim find/replace application.
//!
//! Changes are located by exact substring match against the content as it
//! stands after every earlier change in the same call, never by line number.
//! A change whose `old_code` is missing or occurs more than once is rejected
//! rather than guessed at. Syntax is not inspected here; a patched file that
//! no longer parses is reported by the syntax validator instead, which keeps
//! "the patch did not land" separate from "the patch landed and is wrong".

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

use super::{ChangeOp, FixSpec};
use crate::snapshot::Snapshot;

/// Characters of `old_code` quoted in error messages.
const PREFIX_CHARS: usize = 80;

/// Why a change could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyError {
    /// `old_code` does not occur in the current content.
    #[error("change {index}: old_code not found: {prefix:?}")]
    NotFound { index: usize, prefix: String },

    /// `old_code` occurs more than once in the current content.
    #[error("change {index}: old_code matches {count} locations, must be unique: {prefix:?}")]
    Ambiguous {
        index: usize,
        count: usize,
        prefix: String,
    },

    /// The file to modify is not in the snapshot.
    #[error("file does not exist in the snapshot")]
    FileMissing,

    /// The file to create already exists in the snapshot.
    #[error("file already exists in the snapshot; modify it instead of creating it")]
    CreateExists,
}

impl ApplyError {
    /// Short machine-friendly code for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Ambiguous { .. } => "AMBIGUOUS",
            Self::FileMissing => "FILE_MISSING",
            Self::CreateExists => "CREATE_EXISTS",
        }
    }
}

enum Occurrences {
    None,
    One(usize),
    Many(usize),
}

/// Count occurrences of `needle`, including overlapping ones.
fn occurrences(haystack: &str, needle: &str) -> Occurrences {
    let Some(first) = haystack.find(needle) else {
        return Occurrences::None;
    };

    let mut count = 1;
    let mut from = first;
    loop {
        // Step past one character so overlapping matches are counted too.
        let step = haystack[from..].chars().next().map_or(1, char::len_utf8);
        from += step;
        match haystack.get(from..).and_then(|rest| rest.find(needle)) {
            Some(offset) => {
                count += 1;
                from += offset;
            }
            None => break,
        }
    }

    if count == 1 {
        Occurrences::One(first)
    } else {
        Occurrences::Many(count)
    }
}

fn prefix_of(old_code: &str) -> String {
    let prefix: String = old_code.chars().take(PREFIX_CHARS).collect();
    if old_code.chars().count() > PREFIX_CHARS {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

/// Apply `changes` in order to `content`.
///
/// Each change sees the result of the changes before it. Bytes outside the
/// replaced span are never touched.
///
/// # Errors
///
/// Returns [`ApplyError::NotFound`] or [`ApplyError::Ambiguous`] for the first
/// change that does not match exactly once. `index` is 1-based.
///
/// # Example
///
/// ```rust
/// use fixgate::fix::{apply, ApplyError, ChangeOp};
///
/// let content = "const pool = new Pool({ max: 10 })\n";
/// let changes = [ChangeOp::new("max: 10", "max: 20, timeout: 10000")];
/// let patched = apply(content, &changes).unwrap();
/// assert_eq!(patched, "const pool = new Pool({ max: 20, timeout: 10000 })\n");
///
/// let err = apply("a a", &[ChangeOp::new("a", "b")]).unwrap_err();
/// assert!(matches!(err, ApplyError::Ambiguous { count: 2, .. }));
/// ```
pub fn apply<'a, I>(content: &str, changes: I) -> Result<String, ApplyError>
where
    I: IntoIterator<Item = &'a ChangeOp>,
{
    let mut current = content.to_string();

    for (i, change) in changes.into_iter().enumerate() {
        let index = i + 1;
        match occurrences(&current, &change.old_code) {
            Occurrences::None => {
                return Err(ApplyError::NotFound {
                    index,
                    prefix: prefix_of(&change.old_code),
                })
            }
            Occurrences::Many(count) => {
                return Err(ApplyError::Ambiguous {
                    index,
                    count,
                    prefix: prefix_of(&change.old_code),
                })
            }
            Occurrences::One(start) => {
                let end = start + change.old_code.len();
                current.replace_range(start..end, &change.new_code);
            }
        }
    }

    Ok(current)
}

/// A file that could not be patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileApplyFailure {
    pub path: String,
    pub error: ApplyError,
}

/// The file set produced by applying a fix to a snapshot.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    /// Snapshot contents overlaid with every successfully patched or created file.
    pub files: BTreeMap<String, String>,
    /// Paths patched or created successfully, sorted.
    pub touched: Vec<String>,
    /// Paths that were created rather than modified.
    pub created: BTreeSet<String>,
    /// Files that could not be patched, in path order.
    pub failures: Vec<FileApplyFailure>,
}

impl CandidateSet {
    /// Whether every file in the fix was applied.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Content of a touched file.
    pub fn content(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }
}

/// Apply a whole fix against a snapshot.
///
/// The snapshot is not mutated. Files that fail keep their snapshot content
/// in [`CandidateSet::files`] and are listed in [`CandidateSet::failures`].
pub fn apply_fix(fix: &FixSpec, snapshot: &Snapshot) -> CandidateSet {
    let mut candidate = CandidateSet {
        files: snapshot.clone(),
        ..CandidateSet::default()
    };
    let mut touched = BTreeSet::new();

    for (path, changes) in fix.grouped_changes() {
        let Some(original) = snapshot.get(path) else {
            candidate.failures.push(FileApplyFailure {
                path: path.to_string(),
                error: ApplyError::FileMissing,
            });
            continue;
        };

        match apply(original, changes.iter().copied()) {
            Ok(patched) => {
                debug!(path, changes = changes.len(), "Applied changes");
                candidate.files.insert(path.to_string(), patched);
                touched.insert(path.to_string());
            }
            Err(error) => {
                debug!(path, %error, "Patch did not apply");
                candidate.failures.push(FileApplyFailure {
                    path: path.to_string(),
                    error,
                });
            }
        }
    }

    for file in &fix.files_to_create {
        if snapshot.contains_key(&file.path) {
            candidate.failures.push(FileApplyFailure {
                path: file.path.clone(),
                error: ApplyError::CreateExists,
            });
            continue;
        }
        candidate
            .files
            .insert(file.path.clone(), file.content.clone());
        candidate.created.insert(file.path.clone());
        touched.insert(file.path.clone());
    }

    candidate.failures.sort_by(|a, b| a.path.cmp(&b.path));
    candidate.touched = touched.into_iter().collect();
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(&str, &str)]) -> Snapshot {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_single_match_replaces_only_span() {
        let content = "header\nconst pool = new Pool({ max: 10 })\nfooter\n";
        let changes = [ChangeOp::new(
            "const pool = new Pool({ max: 10 })",
            "const pool = new Pool({ max: 20, timeout: 10000 })",
        )];
        let patched = apply(content, &changes).unwrap();
        assert_eq!(
            patched,
            "header\nconst pool = new Pool({ max: 20, timeout: 10000 })\nfooter\n"
        );
    }

    #[test]
    fn test_bytes_outside_span_identical() {
        let content = "  \t leading\r\nMIDDLE\r\n trailing \u{1F600}";
        let patched = apply(content, &[ChangeOp::new("MIDDLE", "m")]).unwrap();
        let start = content.find("MIDDLE").unwrap();
        assert_eq!(&patched[..start], &content[..start]);
        assert_eq!(&patched[start + 1..], &content[start + "MIDDLE".len()..]);
    }

    #[test]
    fn test_not_found() {
        let err = apply("fn main() {}", &[ChangeOp::new("fn other()", "x")]).unwrap_err();
        assert_eq!(
            err,
            ApplyError::NotFound {
                index: 1,
                prefix: "fn other()".to_string()
            }
        );
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_ambiguous_two_occurrences() {
        let err = apply("x = 1\nx = 1\n", &[ChangeOp::new("x = 1", "x = 2")]).unwrap_err();
        assert!(matches!(err, ApplyError::Ambiguous { index: 1, count: 2, .. }));
        assert_eq!(err.code(), "AMBIGUOUS");
    }

    #[test]
    fn test_ambiguous_counts_overlapping_matches() {
        let err = apply("aaa", &[ChangeOp::new("aa", "b")]).unwrap_err();
        assert!(matches!(err, ApplyError::Ambiguous { count: 2, .. }));
    }

    #[test]
    fn test_later_changes_see_earlier_edits() {
        let content = "let a = 1;\nlet b = 2;\n";
        let changes = [
            ChangeOp::new("let a = 1;", "let a = 10;\nlet c = 3;"),
            ChangeOp::new("let c = 3;", "let c = 30;"),
        ];
        let patched = apply(content, &changes).unwrap();
        assert_eq!(patched, "let a = 10;\nlet c = 30;\nlet b = 2;\n");
    }

    #[test]
    fn test_earlier_edit_can_make_later_change_ambiguous() {
        let content = "value\n";
        let changes = [
            ChangeOp::new("value", "value\nvalue"),
            ChangeOp::new("value", "other"),
        ];
        let err = apply(content, &changes).unwrap_err();
        assert!(matches!(err, ApplyError::Ambiguous { index: 2, .. }));
    }

    #[test]
    fn test_error_index_is_one_based() {
        let changes = [ChangeOp::new("a", "b"), ChangeOp::new("zzz", "y")];
        let err = apply("a", &changes).unwrap_err();
        assert!(matches!(err, ApplyError::NotFound { index: 2, .. }));
    }

    #[test]
    fn test_prefix_is_truncated() {
        let long = "x".repeat(200);
        let err = apply("", &[ChangeOp::new(long, "y")]).unwrap_err();
        if let ApplyError::NotFound { prefix, .. } = err {
            assert!(prefix.ends_with("..."));
            assert_eq!(prefix.chars().count(), PREFIX_CHARS + 3);
        } else {
            panic!("expected NotFound");
        }
    }

    #[test]
    fn test_multibyte_content() {
        let content = "héllo wörld héllo";
        let err = apply(content, &[ChangeOp::new("héllo", "hi")]).unwrap_err();
        assert!(matches!(err, ApplyError::Ambiguous { count: 2, .. }));

        let patched = apply(content, &[ChangeOp::new("wörld", "world")]).unwrap();
        assert_eq!(patched, "héllo world héllo");
    }

    #[test]
    fn test_apply_fix_overlays_snapshot() {
        let snap = snapshot(&[("app.js", "max: 10\n"), ("other.js", "keep\n")]);
        let fix = FixSpec::new()
            .modify("app.js", vec![ChangeOp::new("max: 10", "max: 20")])
            .create("new.js", "module.exports = {};\n");

        let candidate = apply_fix(&fix, &snap);
        assert!(candidate.is_clean());
        assert_eq!(candidate.content("app.js"), Some("max: 20\n"));
        assert_eq!(candidate.content("other.js"), Some("keep\n"));
        assert_eq!(candidate.content("new.js"), Some("module.exports = {};\n"));
        assert_eq!(candidate.touched, vec!["app.js", "new.js"]);
        assert!(candidate.created.contains("new.js"));
        // Input snapshot untouched
        assert_eq!(snap.get("app.js").map(String::as_str), Some("max: 10\n"));
    }

    #[test]
    fn test_apply_fix_records_failures() {
        let snap = snapshot(&[("a.py", "x = 1\nx = 1\n"), ("b.py", "y = 2\n")]);
        let fix = FixSpec::new()
            .modify("missing.py", vec![ChangeOp::new("a", "b")])
            .modify("a.py", vec![ChangeOp::new("x = 1", "x = 2")])
            .create("b.py", "z = 3\n");

        let candidate = apply_fix(&fix, &snap);
        assert!(!candidate.is_clean());
        let paths: Vec<_> = candidate.failures.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py", "missing.py"]);
        assert_eq!(candidate.failures[2].error, ApplyError::FileMissing);
        assert_eq!(candidate.failures[1].error, ApplyError::CreateExists);
        assert!(candidate.touched.is_empty());
        assert_eq!(candidate.content("b.py"), Some("y = 2\n"));
    }
}
