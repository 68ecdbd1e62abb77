//! The fix payload proposed by the fix-generation collaborator.
//!
//! A [`FixSpec`] is a set of verbatim find/replace operations against
//! existing files plus a set of new files. Payloads arrive as model output,
//! so they are parsed strictly: [`FixSpec::parse_response`] extracts the JSON
//! object, deserializes it into typed structs and then checks the schema
//! rules that serde cannot express. A payload that fails here is unusable
//! and must not be partially applied.
//!
//! # Example
//!
//! ```rust
//! use fixgate::fix::FixSpec;
//!
//! let response = r#"Here is the fix: {
//!   "files_to_modify": [{
//!     "path": "app.js",
//!     "changes": [{"old_code": "max: 10", "new_code": "max: 20", "explanation": "raise pool size"}]
//!   }],
//!   "files_to_create": []
//! }"#;
//!
//! let fix = FixSpec::parse_response(response).unwrap();
//! assert_eq!(fix.files_to_modify[0].path, "app.js");
//! ```

pub mod apply;

pub use apply::{apply, apply_fix, ApplyError, CandidateSet, FileApplyFailure};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{FixgateError, Result};

/// A single verbatim find/replace instruction within a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeOp {
    /// Exact text to find. Must occur exactly once in the current content.
    pub old_code: String,
    /// Replacement text.
    pub new_code: String,
    /// Why the change is made.
    #[serde(default)]
    pub explanation: String,
}

impl ChangeOp {
    /// Create a change without an explanation.
    pub fn new(old_code: impl Into<String>, new_code: impl Into<String>) -> Self {
        Self {
            old_code: old_code.into(),
            new_code: new_code.into(),
            explanation: String::new(),
        }
    }

    /// Add an explanation.
    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }
}

/// Ordered changes to one existing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileChange {
    /// Repository-relative path.
    pub path: String,
    /// Changes applied in array order.
    pub changes: Vec<ChangeOp>,
}

/// A file to be written verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewFile {
    /// Repository-relative path.
    pub path: String,
    /// Full file content.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// The structured set of edits proposed for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSpec {
    #[serde(default)]
    pub files_to_modify: Vec<FileChange>,
    #[serde(default)]
    pub files_to_create: Vec<NewFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testing_notes: Option<String>,
    /// Generator's self-reported confidence, 0..=100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl FixSpec {
    /// Create an empty fix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add changes for an existing file.
    #[must_use]
    pub fn modify(mut self, path: impl Into<String>, changes: Vec<ChangeOp>) -> Self {
        self.files_to_modify.push(FileChange {
            path: path.into(),
            changes,
        });
        self
    }

    /// Add a new file.
    #[must_use]
    pub fn create(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files_to_create.push(NewFile {
            path: path.into(),
            content: content.into(),
            explanation: None,
        });
        self
    }

    /// Parse a raw collaborator response.
    ///
    /// The JSON object may be bare, inside a ```` ```json ```` fence, inside
    /// an untagged fence, or surrounded by prose.
    ///
    /// # Errors
    ///
    /// Returns [`FixgateError::MalformedFix`] if no JSON object can be found,
    /// the JSON does not match the schema, or a schema rule is violated.
    pub fn parse_response(response: &str) -> Result<Self> {
        let json = extract_json(response)
            .ok_or_else(|| FixgateError::malformed("no JSON object found in response"))?;
        Self::from_json(json)
    }

    /// Parse and validate a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`FixgateError::MalformedFix`] on any deserialization or
    /// schema failure.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut fix: FixSpec =
            serde_json::from_str(json).map_err(|e| FixgateError::malformed(e.to_string()))?;
        fix.normalize_paths();
        fix.validate()?;
        debug!(
            modified = fix.files_to_modify.len(),
            created = fix.files_to_create.len(),
            "Parsed fix payload"
        );
        Ok(fix)
    }

    /// Check the schema rules that serde does not enforce.
    ///
    /// # Errors
    ///
    /// Returns [`FixgateError::MalformedFix`] naming the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.files_to_modify.is_empty() && self.files_to_create.is_empty() {
            return Err(FixgateError::malformed(
                "fix contains no files to modify or create",
            ));
        }

        for file in &self.files_to_modify {
            validate_path(&file.path)?;
            if file.changes.is_empty() {
                return Err(FixgateError::malformed(format!(
                    "files_to_modify entry '{}' has no changes",
                    file.path
                )));
            }
            for (i, change) in file.changes.iter().enumerate() {
                if change.old_code.is_empty() {
                    return Err(FixgateError::malformed(format!(
                        "change {} for '{}' has an empty old_code",
                        i + 1,
                        file.path
                    )));
                }
            }
        }

        let modified: BTreeSet<&str> = self.files_to_modify.iter().map(|f| f.path.as_str()).collect();
        let mut created = BTreeSet::new();
        for file in &self.files_to_create {
            validate_path(&file.path)?;
            if !created.insert(file.path.as_str()) {
                return Err(FixgateError::malformed(format!(
                    "'{}' is listed more than once in files_to_create",
                    file.path
                )));
            }
            if modified.contains(file.path.as_str()) {
                return Err(FixgateError::malformed(format!(
                    "'{}' is listed in both files_to_modify and files_to_create",
                    file.path
                )));
            }
        }

        if let Some(confidence) = self.confidence {
            if confidence > 100 {
                return Err(FixgateError::malformed(format!(
                    "confidence {} is outside 0..=100",
                    confidence
                )));
            }
        }

        Ok(())
    }

    /// Changes grouped by path, in order of first appearance.
    ///
    /// Repeated entries for one path are concatenated in document order.
    pub fn grouped_changes(&self) -> Vec<(&str, Vec<&ChangeOp>)> {
        let mut groups: Vec<(&str, Vec<&ChangeOp>)> = Vec::new();
        for file in &self.files_to_modify {
            match groups.iter_mut().find(|(path, _)| *path == file.path) {
                Some((_, changes)) => changes.extend(file.changes.iter()),
                None => groups.push((file.path.as_str(), file.changes.iter().collect())),
            }
        }
        groups
    }

    /// Every path the fix modifies or creates, sorted and deduplicated.
    pub fn touched_paths(&self) -> Vec<String> {
        let paths: BTreeSet<&str> = self
            .files_to_modify
            .iter()
            .map(|f| f.path.as_str())
            .chain(self.files_to_create.iter().map(|f| f.path.as_str()))
            .collect();
        paths.into_iter().map(String::from).collect()
    }

    /// Total number of change operations.
    pub fn change_count(&self) -> usize {
        self.files_to_modify.iter().map(|f| f.changes.len()).sum()
    }

    /// Stable SHA-256 digest of the fix, hex encoded.
    pub fn digest(&self) -> String {
        // Struct field order is fixed, so the serialized form is canonical.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    fn normalize_paths(&mut self) {
        for file in &mut self.files_to_modify {
            file.path = normalize_path(&file.path);
        }
        for file in &mut self.files_to_create {
            file.path = normalize_path(&file.path);
        }
    }
}

/// Normalize a repository-relative path: forward slashes, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_string();
    }
    normalized
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(FixgateError::malformed("file path is empty"));
    }
    if path.starts_with('/') || path.chars().nth(1) == Some(':') {
        return Err(FixgateError::malformed(format!(
            "file path '{}' must be repository-relative",
            path
        )));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(FixgateError::malformed(format!(
            "file path '{}' escapes the repository",
            path
        )));
    }
    Ok(())
}

/// Locate the JSON object inside a model response.
fn extract_json(response: &str) -> Option<&str> {
    if let Some(start) = response.find("```json") {
        let body = &response[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        return Some(body[..end].trim());
    }

    if let Some(start) = response.find("```") {
        let body = &response[start + 3..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "files_to_modify": [
            {"path": "app.js", "changes": [{"old_code": "max: 10", "new_code": "max: 20", "explanation": "pool"}]}
        ],
        "files_to_create": [
            {"path": "test/pool.test.js", "content": "test('x', () => {});\n"}
        ],
        "summary": "Increase pool size",
        "confidence": 85
    }"#;

    #[test]
    fn test_parse_bare_json() {
        let fix = FixSpec::parse_response(VALID).unwrap();
        assert_eq!(fix.files_to_modify.len(), 1);
        assert_eq!(fix.files_to_create.len(), 1);
        assert_eq!(fix.summary.as_deref(), Some("Increase pool size"));
        assert_eq!(fix.confidence, Some(85));
    }

    #[test]
    fn test_parse_fenced_json() {
        let response = format!("Sure, here you go:\n```json\n{}\n```\nLet me know.", VALID);
        let fix = FixSpec::parse_response(&response).unwrap();
        assert_eq!(fix.files_to_modify[0].changes[0].new_code, "max: 20");
    }

    #[test]
    fn test_parse_untagged_fence() {
        let response = format!("```\n{}\n```", VALID);
        assert!(FixSpec::parse_response(&response).is_ok());
    }

    #[test]
    fn test_parse_json_surrounded_by_prose() {
        let response = format!("The fix is {} and that's it.", VALID);
        assert!(FixSpec::parse_response(&response).is_ok());
    }

    #[test]
    fn test_parse_no_json_is_malformed() {
        let err = FixSpec::parse_response("I could not find a fix.").unwrap_err();
        assert!(matches!(err, FixgateError::MalformedFix { .. }));
    }

    #[test]
    fn test_missing_required_field_is_malformed() {
        let json = r#"{"files_to_modify": [{"path": "a.js", "changes": [{"new_code": "x"}]}]}"#;
        let err = FixSpec::from_json(json).unwrap_err();
        assert!(err.to_string().contains("old_code"));
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let json = r#"{"files_to_modify": "app.js"}"#;
        assert!(matches!(
            FixSpec::from_json(json),
            Err(FixgateError::MalformedFix { .. })
        ));
    }

    #[test]
    fn test_unknown_change_field_is_malformed() {
        let json = r#"{"files_to_modify": [{"path": "a.js", "changes": [{"old_code": "a", "new_code": "b", "old_string": "a"}]}]}"#;
        assert!(FixSpec::from_json(json).is_err());
    }

    #[test]
    fn test_empty_fix_is_malformed() {
        let err = FixSpec::from_json(r#"{"files_to_modify": [], "files_to_create": []}"#).unwrap_err();
        assert!(err.to_string().contains("no files"));
    }

    #[test]
    fn test_empty_old_code_is_malformed() {
        let fix = FixSpec::new().modify("a.py", vec![ChangeOp::new("", "x = 1")]);
        assert!(fix.validate().is_err());
    }

    #[test]
    fn test_path_traversal_is_malformed() {
        let fix = FixSpec::new().create("../outside.txt", "x");
        assert!(fix.validate().unwrap_err().to_string().contains("escapes"));

        let fix = FixSpec::new().create("/etc/passwd", "x");
        assert!(fix.validate().unwrap_err().to_string().contains("relative"));
    }

    #[test]
    fn test_create_and_modify_same_path_is_malformed() {
        let fix = FixSpec::new()
            .modify("a.py", vec![ChangeOp::new("x", "y")])
            .create("a.py", "z");
        assert!(fix.validate().is_err());
    }

    #[test]
    fn test_confidence_out_of_range_is_malformed() {
        let json = r#"{"files_to_create": [{"path": "a.txt", "content": "x"}], "confidence": 150}"#;
        assert!(FixSpec::from_json(json).is_err());
    }

    #[test]
    fn test_paths_are_normalized() {
        let json = r#"{"files_to_create": [{"path": "./src\\new.py", "content": "x = 1\n"}]}"#;
        let fix = FixSpec::from_json(json).unwrap();
        assert_eq!(fix.files_to_create[0].path, "src/new.py");
    }

    #[test]
    fn test_grouped_changes_concatenates_in_order() {
        let fix = FixSpec::new()
            .modify("a.js", vec![ChangeOp::new("1", "2")])
            .modify("b.js", vec![ChangeOp::new("3", "4")])
            .modify("a.js", vec![ChangeOp::new("5", "6")]);
        let groups = fix.grouped_changes();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "a.js");
        let olds: Vec<_> = groups[0].1.iter().map(|c| c.old_code.as_str()).collect();
        assert_eq!(olds, vec!["1", "5"]);
    }

    #[test]
    fn test_touched_paths_sorted() {
        let fix = FixSpec::new()
            .modify("z.js", vec![ChangeOp::new("1", "2")])
            .create("a.js", "x");
        assert_eq!(fix.touched_paths(), vec!["a.js", "z.js"]);
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let a = FixSpec::new().create("a.txt", "one");
        let b = FixSpec::new().create("a.txt", "one");
        let c = FixSpec::new().create("a.txt", "two");
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
