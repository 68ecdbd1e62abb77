//! Tree-sitter syntax validation.
//!
//! A file is valid when its parse tree contains no `ERROR` or `MISSING`
//! nodes. Files with no grammar are skipped and reported as warnings by the
//! aggregator, never as failures.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tracing::warn;
use tree_sitter::{Node, Parser, Tree};

use crate::language::Language;

/// Default cap on errors reported per file.
pub const DEFAULT_MAX_ERRORS: usize = 20;

/// Characters of an `ERROR` node's source quoted in its message.
const SNIPPET_CHARS: usize = 40;

// ============================================================================
// Thread-local parser pool
// ============================================================================

/// A parser for `language`, or `None` if the grammar is incompatible with
/// the linked tree-sitter runtime.
fn new_parser(language: tree_sitter::Language, grammar: &str) -> Option<Parser> {
    let mut parser = Parser::new();
    match parser.set_language(&language) {
        Ok(()) => Some(parser),
        Err(e) => {
            warn!(grammar, error = %e, "Grammar unavailable; its files will be skipped");
            None
        }
    }
}

thread_local! {
    static RUST_PARSER: RefCell<Option<Parser>> =
        RefCell::new(new_parser(tree_sitter_rust::LANGUAGE.into(), "rust"));
    static JS_PARSER: RefCell<Option<Parser>> =
        RefCell::new(new_parser(tree_sitter_javascript::LANGUAGE.into(), "javascript"));
    static TS_PARSER: RefCell<Option<Parser>> =
        RefCell::new(new_parser(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(), "typescript"));
    static TSX_PARSER: RefCell<Option<Parser>> =
        RefCell::new(new_parser(tree_sitter_typescript::LANGUAGE_TSX.into(), "tsx"));
    static PYTHON_PARSER: RefCell<Option<Parser>> =
        RefCell::new(new_parser(tree_sitter_python::LANGUAGE.into(), "python"));
    static GO_PARSER: RefCell<Option<Parser>> =
        RefCell::new(new_parser(tree_sitter_go::LANGUAGE.into(), "go"));
    static JSON_PARSER: RefCell<Option<Parser>> =
        RefCell::new(new_parser(tree_sitter_json::LANGUAGE.into(), "json"));
}

/// Grammar chosen for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    Rust,
    JavaScript,
    TypeScript,
    Tsx,
    Python,
    Go,
    Json,
}

impl Grammar {
    fn for_path(path: &str) -> Option<Self> {
        match Language::from_path(path)? {
            Language::Rust => Some(Self::Rust),
            Language::JavaScript => Some(Self::JavaScript),
            Language::TypeScript if path.to_ascii_lowercase().ends_with(".tsx") => Some(Self::Tsx),
            Language::TypeScript => Some(Self::TypeScript),
            Language::Python => Some(Self::Python),
            Language::Go => Some(Self::Go),
            Language::Json => Some(Self::Json),
        }
    }

    fn parse(self, content: &str) -> Option<Tree> {
        let run = |p: &RefCell<Option<Parser>>| {
            p.borrow_mut().as_mut().and_then(|p| p.parse(content, None))
        };
        match self {
            Self::Rust => RUST_PARSER.with(run),
            Self::JavaScript => JS_PARSER.with(run),
            Self::TypeScript => TS_PARSER.with(run),
            Self::Tsx => TSX_PARSER.with(run),
            Self::Python => PYTHON_PARSER.with(run),
            Self::Go => GO_PARSER.with(run),
            Self::Json => JSON_PARSER.with(run),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One syntax error, 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxError {
    pub line: u32,
    pub message: String,
}

/// Result of validating one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxResult {
    pub ok: bool,
    /// Errors sorted by line, capped.
    pub errors: Vec<SyntaxError>,
    /// No parser exists for the file, or it could not produce a tree.
    pub skipped: bool,
    /// Errors found before the cap was applied.
    pub total_errors: usize,
}

impl SyntaxResult {
    fn valid() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    fn skipped() -> Self {
        Self {
            ok: true,
            skipped: true,
            ..Self::default()
        }
    }
}

/// Syntax checking seam used by the aggregator.
pub trait SyntaxCheck: Send + Sync {
    fn validate(&self, path: &str, content: &str) -> SyntaxResult;
}

/// Tree-sitter backed [`SyntaxCheck`].
#[derive(Debug, Clone)]
pub struct SyntaxValidator {
    max_errors: usize,
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
        }
    }
}

impl SyntaxValidator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors.max(1);
        self
    }
}

impl SyntaxCheck for SyntaxValidator {
    fn validate(&self, path: &str, content: &str) -> SyntaxResult {
        validate_with_limit(path, content, self.max_errors)
    }
}

/// Validate with the default error cap.
///
/// # Example
///
/// ```rust
/// use fixgate::validate::syntax::validate;
///
/// assert!(validate("app.py", "def f():\n    return 1\n").ok);
///
/// let result = validate("app.py", "def f(:\n    return 1\n");
/// assert!(!result.ok);
/// assert!(!result.errors.is_empty());
///
/// assert!(validate("README.md", "# hi").skipped);
/// ```
pub fn validate(path: &str, content: &str) -> SyntaxResult {
    validate_with_limit(path, content, DEFAULT_MAX_ERRORS)
}

fn validate_with_limit(path: &str, content: &str, max_errors: usize) -> SyntaxResult {
    let Some(grammar) = Grammar::for_path(path) else {
        return SyntaxResult::skipped();
    };

    check_tree(path, grammar.parse(content).as_ref(), content, max_errors)
}

/// Turn a parse tree into a result. A missing tree means the parser was
/// unavailable, which skips the file rather than failing it.
fn check_tree(path: &str, tree: Option<&Tree>, content: &str, max_errors: usize) -> SyntaxResult {
    let Some(tree) = tree else {
        warn!(path, "Parser produced no tree; syntax check skipped");
        return SyntaxResult::skipped();
    };

    let root = tree.root_node();
    if !root.has_error() {
        return SyntaxResult::valid();
    }

    let mut found = Vec::new();
    collect_errors(root, content, &mut found);
    if found.is_empty() {
        found.push((0, 0, "syntax error".to_string()));
    }
    found.sort_by_key(|(row, col, _)| (*row, *col));
    found.dedup();

    let total_errors = found.len();
    let errors = found
        .into_iter()
        .take(max_errors)
        .map(|(row, _, message)| SyntaxError {
            line: u32::try_from(row + 1).unwrap_or(u32::MAX),
            message,
        })
        .collect();

    SyntaxResult {
        ok: false,
        errors,
        skipped: false,
        total_errors,
    }
}

/// Walk the tree collecting `ERROR` and `MISSING` nodes as (row, column, message).
fn collect_errors(root: Node<'_>, source: &str, out: &mut Vec<(usize, usize, String)>) {
    let mut cursor = root.walk();
    let mut descend = true;

    loop {
        let node = cursor.node();
        if descend {
            if node.is_error() {
                let pos = node.start_position();
                out.push((pos.row, pos.column, describe_error(node, source)));
            } else if node.is_missing() {
                let pos = node.start_position();
                out.push((pos.row, pos.column, format!("missing `{}`", node.kind())));
            }
        }

        // Errors nested inside an ERROR node describe the same region.
        if descend && !node.is_error() && node.has_error() && cursor.goto_first_child() {
            continue;
        }
        if cursor.goto_next_sibling() {
            descend = true;
            continue;
        }
        descend = false;
        if !cursor.goto_parent() {
            break;
        }
    }
}

fn describe_error(node: Node<'_>, source: &str) -> String {
    let text = node.utf8_text(source.as_bytes()).unwrap_or("");
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "unexpected end of input".to_string();
    }
    let mut snippet: String = first_line.chars().take(SNIPPET_CHARS).collect();
    if first_line.chars().count() > SNIPPET_CHARS {
        snippet.push_str("...");
    }
    format!("unexpected `{}`", snippet)
}
