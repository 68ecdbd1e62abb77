//! Dependency checking: every external import must be declared.
//!
//! Imports are found lexically with regular expressions. This misses
//! computed imports and may match imports inside comments or strings; it is a
//! cheap pre-build signal, not a resolver.
//!
//! # Example
//!
//! ```rust
//! use fixgate::validate::deps::{check, Manifest};
//! use fixgate::Language;
//!
//! let manifest = Manifest::parse("requirements.txt", "flask==2.0\n").unwrap();
//! let code = "import os\nimport flask\nimport requests\n";
//! assert_eq!(check(code, &manifest, Language::Python), vec!["requests"]);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use thiserror::Error;

use crate::language::Language;

// ============================================================================
// Builtins
// ============================================================================

/// Python standard library top-level modules (`sys.stdlib_module_names`).
const PYTHON_BUILTINS: &[&str] = &[
    "__future__", "__main__", "_abc", "_ast", "_asyncio", "_bisect", "_bootlocale", "_bz2",
    "_codecs", "_collections_abc", "_compat_pickle", "_compression", "_contextvars", "_csv",
    "_ctypes", "_datetime", "_decimal", "_functools", "_hashlib", "_heapq", "_io", "_json",
    "_locale", "_lzma", "_markupbase", "_md5", "_opcode", "_operator", "_osx_support", "_pickle",
    "_posixsubprocess", "_py_abc", "_pydatetime", "_pydecimal", "_pyio", "_queue", "_random",
    "_sha256", "_signal", "_sitebuiltins", "_socket", "_sqlite3", "_sre", "_ssl", "_stat",
    "_strptime", "_string", "_struct", "_thread", "_threading_local", "_tracemalloc", "_typing",
    "_warnings", "_weakref", "_weakrefset", "_winapi", "_zoneinfo", "abc", "aifc", "antigravity",
    "argparse", "array", "ast", "asynchat", "asyncio", "asyncore", "atexit", "audioop", "base64",
    "bdb", "binascii", "bisect", "builtins", "bz2", "cProfile", "calendar", "cgi", "cgitb",
    "chunk", "cmath", "cmd", "code", "codecs", "codeop", "collections", "colorsys", "compileall",
    "concurrent", "configparser", "contextlib", "contextvars", "copy", "copyreg", "crypt", "csv",
    "ctypes", "curses", "dataclasses", "datetime", "dbm", "decimal", "difflib", "dis", "distutils",
    "doctest", "email", "encodings", "ensurepip", "enum", "errno", "faulthandler", "fcntl",
    "filecmp", "fileinput", "fnmatch", "fractions", "ftplib", "functools", "gc", "genericpath",
    "getopt", "getpass", "gettext", "glob", "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac",
    "html", "http", "idlelib", "imaplib", "imghdr", "imp", "importlib", "inspect", "io",
    "ipaddress", "itertools", "json", "keyword", "lib2to3", "linecache", "locale", "logging",
    "lzma", "mailbox", "mailcap", "marshal", "math", "mimetypes", "mmap", "modulefinder", "msilib",
    "msvcrt", "multiprocessing", "netrc", "nis", "nntplib", "nt", "ntpath", "nturl2path",
    "numbers", "opcode", "operator", "optparse", "os", "ossaudiodev", "pathlib", "pdb", "pickle",
    "pickletools", "pipes", "pkgutil", "platform", "plistlib", "poplib", "posix", "posixpath",
    "pprint", "profile", "pstats", "pty", "pwd", "py_compile", "pyclbr", "pydoc", "pydoc_data",
    "pyexpat", "queue", "quopri", "random", "re", "readline", "reprlib", "resource", "rlcompleter",
    "runpy", "sched", "secrets", "select", "selectors", "shelve", "shlex", "shutil", "signal",
    "site", "smtpd", "smtplib", "sndhdr", "socket", "socketserver", "spwd", "sqlite3",
    "sre_compile", "sre_constants", "sre_parse", "ssl", "stat", "statistics", "string",
    "stringprep", "struct", "subprocess", "sunau", "symtable", "sys", "sysconfig", "syslog",
    "tabnanny", "tarfile", "telnetlib", "tempfile", "termios", "textwrap", "this", "threading",
    "time", "timeit", "tkinter", "token", "tokenize", "tomllib", "trace", "traceback",
    "tracemalloc", "tty", "turtle", "turtledemo", "types", "typing", "unicodedata", "unittest",
    "urllib", "uu", "uuid", "venv", "warnings", "wave", "weakref", "webbrowser", "winreg",
    "winsound", "wsgiref", "xdrlib", "xml", "xmlrpc", "zipapp", "zipfile", "zipimport", "zlib",
    "zoneinfo",
];

/// Node core modules importable without the `node:` scheme (`module.builtinModules`).
const NODE_BUILTINS: &[&str] = &[
    "_http_agent", "_http_client", "_http_common", "_http_incoming", "_http_outgoing",
    "_http_server", "_stream_duplex", "_stream_passthrough", "_stream_readable",
    "_stream_transform", "_stream_wrap", "_stream_writable", "_tls_common", "_tls_wrap", "assert",
    "async_hooks", "buffer", "child_process", "cluster", "console", "constants", "crypto", "dgram",
    "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2", "https", "inspector",
    "module", "net", "os", "path", "perf_hooks", "process", "punycode", "querystring", "readline",
    "repl", "stream", "string_decoder", "sys", "timers", "tls", "trace_events", "tty", "url",
    "util", "v8", "vm", "wasi", "worker_threads", "zlib",
];

/// Scheme that marks a Node core module; `node:test` and `node:sqlite` exist only under it.
const NODE_SCHEME: &str = "node:";

const RUST_BUILTINS: &[&str] = &["std", "core", "alloc", "proc_macro", "test"];

/// Path roots that refer to the current crate rather than a dependency.
const RUST_LOCAL_ROOTS: &[&str] = &["crate", "self", "super", "Self"];

// ============================================================================
// Manifests
// ============================================================================

/// Supported dependency manifest formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ManifestKind {
    PackageJson,
    Requirements,
    GoMod,
    CargoToml,
}

impl ManifestKind {
    /// Detect a manifest by file name.
    pub fn from_path(path: &str) -> Option<Self> {
        match path.rsplit(['/', '\\']).next()? {
            "package.json" => Some(Self::PackageJson),
            "requirements.txt" => Some(Self::Requirements),
            "go.mod" => Some(Self::GoMod),
            "Cargo.toml" => Some(Self::CargoToml),
            _ => None,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Self::PackageJson => "package.json",
            Self::Requirements => "requirements.txt",
            Self::GoMod => "go.mod",
            Self::CargoToml => "Cargo.toml",
        }
    }

    /// The manifest kind that declares dependencies for `language`, if checked.
    pub fn for_language(language: Language) -> Option<Self> {
        match language {
            Language::JavaScript | Language::TypeScript => Some(Self::PackageJson),
            Language::Python => Some(Self::Requirements),
            Language::Go => Some(Self::GoMod),
            Language::Rust => Some(Self::CargoToml),
            _ => None,
        }
    }
}

/// Manifest could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("unrecognized manifest file: {path}")]
    UnknownKind { path: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

/// Parsed dependency declarations. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub path: String,
    pub kind: ManifestKind,
    /// Declared package names, normalized for comparison.
    pub packages: BTreeSet<String>,
    /// Own module or package name (go.mod `module`, Cargo `package.name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own_name: Option<String>,
}

impl Manifest {
    /// Parse manifest `content`, choosing the format by `path`.
    pub fn parse(path: &str, content: &str) -> Result<Self, ManifestError> {
        let kind = ManifestKind::from_path(path).ok_or_else(|| ManifestError::UnknownKind {
            path: path.to_string(),
        })?;
        let parse_err = |message: String| ManifestError::Parse {
            path: path.to_string(),
            message,
        };

        let (packages, own_name) = match kind {
            ManifestKind::PackageJson => (parse_package_json(content).map_err(parse_err)?, None),
            ManifestKind::Requirements => (parse_requirements(content), None),
            ManifestKind::GoMod => parse_go_mod(content),
            ManifestKind::CargoToml => parse_cargo_toml(content).map_err(parse_err)?,
        };

        Ok(Self {
            path: path.to_string(),
            kind,
            packages,
            own_name,
        })
    }
}

fn parse_package_json(content: &str) -> Result<BTreeSet<String>, String> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let mut packages = BTreeSet::new();
    for section in [
        "dependencies",
        "devDependencies",
        "peerDependencies",
        "optionalDependencies",
    ] {
        if let Some(deps) = value.get(section).and_then(|v| v.as_object()) {
            packages.extend(deps.keys().cloned());
        }
    }
    Ok(packages)
}

fn parse_requirements(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty() && !line.starts_with('-'))
        .filter_map(|line| {
            let name = line
                .split(|c: char| "=<>!~;[ @".contains(c))
                .next()
                .unwrap_or("")
                .trim();
            (!name.is_empty()).then(|| normalize_python(name))
        })
        .collect()
}

fn parse_go_mod(content: &str) -> (BTreeSet<String>, Option<String>) {
    let mut packages = BTreeSet::new();
    let mut module = None;
    let mut in_require_block = false;

    for raw in content.lines() {
        let line = raw.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if in_require_block {
            if line.starts_with(')') {
                in_require_block = false;
            } else if let Some(path) = line.split_whitespace().next() {
                packages.insert(path.to_string());
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("module ") {
            module = Some(rest.trim().trim_matches('"').to_string());
        } else if let Some(rest) = line.strip_prefix("require") {
            let rest = rest.trim();
            if rest.starts_with('(') {
                in_require_block = true;
            } else if let Some(path) = rest.split_whitespace().next() {
                packages.insert(path.to_string());
            }
        }
    }

    (packages, module)
}

fn parse_cargo_toml(content: &str) -> Result<(BTreeSet<String>, Option<String>), String> {
    let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;
    let mut packages = BTreeSet::new();

    let mut collect = |t: &toml::Table| {
        for section in ["dependencies", "dev-dependencies", "build-dependencies"] {
            if let Some(deps) = t.get(section).and_then(|v| v.as_table()) {
                packages.extend(deps.keys().map(|k| normalize_rust(k)));
            }
        }
    };
    collect(&table);
    if let Some(targets) = table.get("target").and_then(|v| v.as_table()) {
        for target in targets.values().filter_map(|v| v.as_table()) {
            collect(target);
        }
    }
    if let Some(workspace) = table.get("workspace").and_then(|v| v.as_table()) {
        collect(workspace);
    }

    let own_name = table
        .get("package")
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .map(normalize_rust);

    Ok((packages, own_name))
}

fn normalize_python(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}

fn normalize_rust(name: &str) -> String {
    name.trim().replace('-', "_")
}

// ============================================================================
// Import extraction
// ============================================================================

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn python_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r"(?m)^\s*import\s+([\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)",
            r"(?m)^\s*from\s+([\w.]+)\s+import\b",
        ])
    })
}

fn js_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
            r#"\b(?:import|export)\s+[^'";]*?\s*from\s*['"]([^'"]+)['"]"#,
            r#"(?m)^\s*import\s*['"]([^'"]+)['"]"#,
            r#"\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#,
        ])
    })
}

fn go_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r#"(?m)^\s*import\s+(?:[\w.]+\s+)?"([^"]+)""#,
            r#"(?s)\bimport\s*\((.*?)\)"#,
            r#""([^"]+)""#,
        ])
    })
}

fn rust_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+(?:::)?([A-Za-z_][A-Za-z0-9_]*)",
            r"(?m)^\s*extern\s+crate\s+([A-Za-z_][A-Za-z0-9_]*)",
        ])
    })
}

fn captures<'a>(re: &Regex, code: &'a str) -> Vec<&'a str> {
    re.captures_iter(code)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Extract the external module names imported by `code`.
///
/// Relative imports and self-references are excluded. Builtins are not
/// filtered here; `node:` imports keep their scheme.
pub fn extract_imports(code: &str, language: Language) -> BTreeSet<String> {
    let mut imports = BTreeSet::new();
    match language {
        Language::Python => {
            for re in python_patterns() {
                for list in captures(re, code) {
                    for item in list.split(',') {
                        let module = item.split_whitespace().next().unwrap_or("");
                        if module.is_empty() || module.starts_with('.') {
                            continue;
                        }
                        if let Some(root) = module.split('.').next() {
                            imports.insert(root.to_string());
                        }
                    }
                }
            }
        }
        Language::JavaScript | Language::TypeScript => {
            for re in js_patterns() {
                for spec in captures(re, code) {
                    if let Some(name) = js_package_name(spec) {
                        imports.insert(name);
                    }
                }
            }
        }
        Language::Go => {
            let patterns = go_patterns();
            if let [single, block, quoted] = patterns {
                imports.extend(captures(single, code).into_iter().map(str::to_string));
                for body in captures(block, code) {
                    imports.extend(captures(quoted, body).into_iter().map(str::to_string));
                }
            }
        }
        Language::Rust => {
            for re in rust_patterns() {
                for root in captures(re, code) {
                    if !RUST_LOCAL_ROOTS.contains(&root) {
                        imports.insert(root.to_string());
                    }
                }
            }
        }
        _ => {}
    }
    imports
}

fn js_package_name(spec: &str) -> Option<String> {
    if spec.starts_with('.') || spec.starts_with('/') {
        return None;
    }
    if let Some(builtin) = spec.strip_prefix(NODE_SCHEME) {
        let name = builtin.split('/').next().unwrap_or(builtin);
        return Some(format!("{}{}", NODE_SCHEME, name));
    }
    let mut segments = spec.split('/');
    let first = segments.next()?;
    if first.starts_with('@') {
        let second = segments.next()?;
        return Some(format!("{}/{}", first, second));
    }
    Some(first.to_string())
}

// ============================================================================
// Checking
// ============================================================================

fn is_available(module: &str, manifest: &Manifest, language: Language) -> bool {
    match language {
        Language::Python => {
            let name = normalize_python(module);
            PYTHON_BUILTINS.contains(&module) || manifest.packages.contains(&name)
        }
        Language::JavaScript | Language::TypeScript => {
            module.starts_with(NODE_SCHEME)
                || NODE_BUILTINS.contains(&module)
                || manifest.packages.contains(module)
        }
        Language::Go => {
            let first = module.split('/').next().unwrap_or(module);
            if !first.contains('.') {
                return true;
            }
            let declared = |prefix: &str| module == prefix || module.starts_with(&format!("{}/", prefix));
            manifest.packages.iter().any(|p| declared(p.as_str()))
                || manifest.own_name.as_deref().is_some_and(declared)
        }
        Language::Rust => {
            let name = normalize_rust(module);
            RUST_BUILTINS.contains(&module)
                || manifest.packages.contains(&name)
                || manifest.own_name.as_deref() == Some(name.as_str())
        }
        _ => true,
    }
}

/// Missing external modules imported by `code`, deduplicated and sorted.
pub fn check(code: &str, manifest: &Manifest, language: Language) -> Vec<String> {
    check_with_locals(code, manifest, language, &BTreeSet::new())
}

/// Like [`check`], treating names in `local` as modules of the project itself.
pub fn check_with_locals(
    code: &str,
    manifest: &Manifest,
    language: Language,
    local: &BTreeSet<String>,
) -> Vec<String> {
    extract_imports(code, language)
        .into_iter()
        .filter(|m| !local.contains(m))
        .filter(|m| !is_available(m, manifest, language))
        .collect()
}

/// Top-level module names a project defines for itself.
///
/// Python: top-level `.py` stems and directories. Rust: file stems and
/// directories directly under `src/`.
pub fn local_modules<'a, I>(paths: I, language: Language) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut locals = BTreeSet::new();
    for path in paths {
        let (base, ext) = match language {
            Language::Python => (path, ".py"),
            Language::Rust => match path.strip_prefix("src/") {
                Some(rest) => (rest, ".rs"),
                None => continue,
            },
            _ => return locals,
        };
        let mut segments = base.split('/');
        let Some(first) = segments.next() else { continue };
        if segments.next().is_some() {
            locals.insert(first.to_string());
        } else if let Some(stem) = first.strip_suffix(ext) {
            locals.insert(stem.to_string());
        }
    }
    locals
}

/// Dependency checking seam used by the aggregator.
pub trait DependencyCheck: Send + Sync {
    fn check(
        &self,
        code: &str,
        manifest: &Manifest,
        language: Language,
        local: &BTreeSet<String>,
    ) -> Vec<String>;
}

/// Regex-based [`DependencyCheck`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyChecker;

impl DependencyCheck for DependencyChecker {
    fn check(
        &self,
        code: &str,
        manifest: &Manifest,
        language: Language,
        local: &BTreeSet<String>,
    ) -> Vec<String> {
        check_with_locals(code, manifest, language, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: BTreeSet<String>) -> Vec<String> {
        set.into_iter().collect()
    }

    #[test]
    fn test_python_imports() {
        let code = "import os\nimport a.b.c, d as e\nfrom f.g import h\nfrom . import local\nfrom .sibling import x\n    import nested\n";
        assert_eq!(
            names(extract_imports(code, Language::Python)),
            vec!["a", "d", "f", "nested", "os"]
        );
    }

    #[test]
    fn test_js_imports() {
        let code = r#"
const pg = require('pg');
import express from "express";
import { a,
  b } from '@scope/pkg/sub';
import './side-effect.css';
import 'reflect-metadata';
export * from 'lodash/fp';
const lazy = await import('chalk');
import fs from 'node:fs/promises';
const local = require('./local');
import abs from '/abs/path';
"#;
        assert_eq!(
            names(extract_imports(code, Language::JavaScript)),
            vec!["@scope/pkg", "chalk", "express", "lodash", "node:fs", "pg", "reflect-metadata"]
        );
    }

    #[test]
    fn test_go_imports() {
        let code = "package main\n\nimport \"fmt\"\nimport log \"github.com/sirupsen/logrus\"\n\nimport (\n\t\"os\"\n\tgin \"github.com/gin-gonic/gin\"\n)\n";
        assert_eq!(
            names(extract_imports(code, Language::Go)),
            vec!["fmt", "github.com/gin-gonic/gin", "github.com/sirupsen/logrus", "os"]
        );
    }

    #[test]
    fn test_rust_imports() {
        let code = "use std::fmt;\nuse serde::Serialize;\npub(crate) use crate::x;\nuse self::y;\nuse super::z;\nextern crate rand;\nuse ::tokio::sync;\n";
        assert_eq!(
            names(extract_imports(code, Language::Rust)),
            vec!["rand", "serde", "std", "tokio"]
        );
    }

    #[test]
    fn test_requirements_parsing() {
        let manifest = Manifest::parse(
            "requirements.txt",
            "# comment\nFlask==2.0.1\nrequests>=2.0  # http\npython-dateutil\nuvicorn[standard]~=0.20\n-r other.txt\n-e .\nfoo ; python_version < '3.8'\n",
        )
        .unwrap();
        let expected: BTreeSet<String> = ["flask", "requests", "python_dateutil", "uvicorn", "foo"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(manifest.packages, expected);
    }

    #[test]
    fn test_python_name_normalization() {
        let manifest = Manifest::parse("requirements.txt", "PyYAML\nmy-lib\n").unwrap();
        assert!(check("import pyyaml\nimport my_lib\n", &manifest, Language::Python).is_empty());
    }

    #[test]
    fn test_package_json_sections() {
        let manifest = Manifest::parse(
            "package.json",
            r#"{"dependencies": {"pg": "^8"}, "devDependencies": {"jest": "^29"}, "peerDependencies": {"react": "*"}, "optionalDependencies": {"fsevents": "*"}}"#,
        )
        .unwrap();
        assert_eq!(manifest.packages.len(), 4);
        assert!(manifest.packages.contains("react"));
    }

    #[test]
    fn test_package_json_invalid() {
        let err = Manifest::parse("package.json", "{not json").unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn test_unknown_manifest() {
        assert!(matches!(
            Manifest::parse("Gemfile", ""),
            Err(ManifestError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_js_missing_dependency() {
        let manifest = Manifest::parse("package.json", r#"{"dependencies": {"pg": "^8"}}"#).unwrap();
        let code = "const pg = require('pg');\nconst fs = require('fs');\nconst axios = require('axios');\nconst again = require('axios');\n";
        assert_eq!(check(code, &manifest, Language::JavaScript), vec!["axios"]);
    }

    #[test]
    fn test_node_core_modules_never_missing() {
        let manifest = Manifest::parse("package.json", "{}").unwrap();
        let code = "import test from 'node:test';\n\
                    import { DatabaseSync } from 'node:sqlite';\n\
                    import dc from 'node:diagnostics_channel';\n\
                    const inspector = require('inspector');\n\
                    const tracing = require('trace_events');\n\
                    const { WASI } = require('wasi');\n\
                    const { readFile } = require('fs/promises');\n";
        assert!(check(code, &manifest, Language::JavaScript).is_empty());
        // Without the scheme, `test` is an ordinary npm package.
        assert_eq!(check("require('test');", &manifest, Language::JavaScript), vec!["test"]);
    }

    #[test]
    fn test_python_stdlib_never_missing() {
        let manifest = Manifest::parse("requirements.txt", "flask\n").unwrap();
        let code = "import heapq\n\
                    import xml.etree.ElementTree as ET\n\
                    import platform\n\
                    from concurrent.futures import ThreadPoolExecutor\n\
                    import secrets\n\
                    import configparser\n\
                    import zoneinfo, tomllib, graphlib\n\
                    from importlib import metadata\n\
                    import flask\n\
                    import numpy\n";
        assert_eq!(check(code, &manifest, Language::Python), vec!["numpy"]);
    }

    #[test]
    fn test_go_module_prefixes() {
        let manifest = Manifest::parse(
            "go.mod",
            "module example.com/app\n\ngo 1.21\n\nrequire github.com/pkg/errors v0.9.1\n\nrequire (\n\tgithub.com/gin-gonic/gin v1.9.0 // indirect\n)\n",
        )
        .unwrap();
        assert_eq!(manifest.own_name.as_deref(), Some("example.com/app"));

        let code = "import (\n\t\"fmt\"\n\t\"example.com/app/internal/db\"\n\t\"github.com/gin-gonic/gin/binding\"\n\t\"github.com/pkg/errors\"\n\t\"github.com/missing/lib\"\n)\n";
        assert_eq!(check(code, &manifest, Language::Go), vec!["github.com/missing/lib"]);
    }

    #[test]
    fn test_cargo_toml_sections() {
        let manifest = Manifest::parse(
            "Cargo.toml",
            "[package]\nname = \"my-app\"\n\n[dependencies]\nserde = \"1\"\ntokio-util = \"0.7\"\n\n[dev-dependencies]\ntempfile = \"3\"\n\n[target.'cfg(unix)'.dependencies]\nlibc = \"0.2\"\n",
        )
        .unwrap();
        let code = "use serde::Serialize;\nuse tokio_util::codec;\nuse tempfile::TempDir;\nuse libc::c_int;\nuse my_app::Thing;\nuse std::io;\nuse anyhow::Result;\n";
        assert_eq!(check(code, &manifest, Language::Rust), vec!["anyhow"]);
    }

    #[test]
    fn test_cargo_toml_invalid() {
        assert!(Manifest::parse("Cargo.toml", "[package\n").is_err());
    }

    #[test]
    fn test_local_modules() {
        let paths = ["app.py", "utils/helpers.py", "tests/test_app.py", "README.md"];
        let locals = local_modules(paths, Language::Python);
        assert_eq!(names(locals.clone()), vec!["app", "tests", "utils"]);

        let manifest = Manifest::parse("requirements.txt", "").unwrap();
        let missing = check_with_locals("import utils\nimport numpy\n", &manifest, Language::Python, &locals);
        assert_eq!(missing, vec!["numpy"]);

        let rust = local_modules(["src/main.rs", "src/config.rs", "src/fix/mod.rs", "build.rs"], Language::Rust);
        assert_eq!(names(rust), vec!["config", "fix", "main"]);
    }

    #[test]
    fn test_manifest_kind_for_language() {
        assert_eq!(ManifestKind::for_language(Language::TypeScript), Some(ManifestKind::PackageJson));
        assert_eq!(ManifestKind::for_language(Language::JavaScript), Some(ManifestKind::PackageJson));
        assert_eq!(ManifestKind::for_language(Language::Python), Some(ManifestKind::Requirements));
        assert_eq!(ManifestKind::for_language(Language::Json), None);
        assert_eq!(ManifestKind::from_path("web/package.json"), Some(ManifestKind::PackageJson));
    }
}
