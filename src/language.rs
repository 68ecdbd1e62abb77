//! Language detection for candidate files.
//!
//! Syntax and dependency checks dispatch on [`Language`]. Detection is
//! purely by file extension; file contents are never sniffed.
//!
//! # Example
//!
//! ```rust
//! use fixgate::Language;
//!
//! assert_eq!(Language::from_path("src/app.js"), Some(Language::JavaScript));
//! assert_eq!(Language::from_path("Main.java"), None);
//! ```

/// Languages with a syntax or dependency checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    /// JSON data files; syntax only.
    Json,
}

const LANGUAGES: &[Language] = &[
    Language::Rust,
    Language::Python,
    Language::JavaScript,
    Language::TypeScript,
    Language::Go,
    Language::Json,
];

impl Language {
    /// File extensions, with the leading dot.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Rust => &[".rs"],
            Language::Python => &[".py", ".pyi", ".pyw"],
            Language::JavaScript => &[".js", ".jsx", ".mjs", ".cjs"],
            Language::TypeScript => &[".ts", ".tsx", ".mts", ".cts"],
            Language::Go => &[".go"],
            Language::Json => &[".json"],
        }
    }

    /// Detect the language of a repository-relative path by its extension.
    ///
    /// Matching is case-insensitive. Returns `None` for files no checker
    /// handles.
    pub fn from_path(path: &str) -> Option<Self> {
        let file_name = path.rsplit(['/', '\\']).next()?;
        let dot = file_name.rfind('.')?;
        let ext = file_name[dot..].to_ascii_lowercase();

        LANGUAGES
            .iter()
            .copied()
            .find(|lang| lang.extensions().contains(&ext.as_str()))
    }
}
