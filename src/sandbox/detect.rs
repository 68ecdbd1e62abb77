//! Build and test command auto-detection from project files.

use serde_json::Value;

use super::CommandSpec;
use crate::language::Language;
use crate::snapshot::Snapshot;

/// npm's placeholder test script.
const NPM_DEFAULT_TEST: &str = "no test specified";

fn package_scripts(files: &Snapshot) -> Option<serde_json::Map<String, Value>> {
    let content = files.get("package.json")?;
    let value: Value = serde_json::from_str(content).ok()?;
    value.get("scripts")?.as_object().cloned()
}

fn package_mentions(files: &Snapshot, needle: &str) -> bool {
    files
        .get("package.json")
        .is_some_and(|content| content.to_ascii_lowercase().contains(needle))
}

fn has_language(files: &Snapshot, language: Language) -> bool {
    files
        .keys()
        .any(|path| Language::from_path(path) == Some(language))
}

/// Whether `path` names a test file by convention.
///
/// `*.test.{js,ts,jsx,tsx}`, `*.spec.{js,ts,jsx,tsx}`, `test_*.py` and `*_test.py`.
pub fn is_test_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    let js_like = [".js", ".ts", ".jsx", ".tsx"]
        .iter()
        .any(|ext| [".test", ".spec"].iter().any(|kind| name.ends_with(&format!("{}{}", kind, ext))));
    let py_like = name.ends_with(".py")
        && (name.starts_with("test_") || name.trim_end_matches(".py").ends_with("_test"));
    js_like || py_like
}

fn test_files<'a>(files: &'a Snapshot, language_filter: &[Language]) -> Vec<&'a str> {
    files
        .keys()
        .filter(|path| is_test_file(path))
        .filter(|path| Language::from_path(path).is_some_and(|l| language_filter.contains(&l)))
        .map(String::as_str)
        .collect()
}

/// Pick a build command for the project in `files`.
///
/// Returns `None` when nothing buildable is recognized; plain Python
/// projects have no build step.
pub fn detect_build_command(files: &Snapshot) -> Option<CommandSpec> {
    if files.contains_key("package.json") {
        if let Some(scripts) = package_scripts(files) {
            if scripts.contains_key("build") {
                return Some(CommandSpec::new("npm").args(["run", "build"]));
            }
            if scripts.contains_key("compile") {
                return Some(CommandSpec::new("npm").args(["run", "compile"]));
            }
        }
    }

    if files.contains_key("tsconfig.json") && has_language(files, Language::TypeScript) {
        return Some(CommandSpec::new("npx").args(["tsc", "--noEmit"]));
    }

    if files.contains_key("Cargo.toml") {
        return Some(CommandSpec::new("cargo").args(["build", "--quiet"]));
    }
    if files.contains_key("go.mod") {
        return Some(CommandSpec::new("go").args(["build", "./..."]));
    }
    if files.contains_key("pom.xml") {
        return Some(CommandSpec::new("mvn").args(["compile", "-q"]));
    }
    if files.contains_key("build.gradle") || files.contains_key("build.gradle.kts") {
        return Some(CommandSpec::new("gradle").arg("build"));
    }

    None
}

/// Pick a test command for the project in `files`.
pub fn detect_test_command(files: &Snapshot) -> Option<CommandSpec> {
    if files.contains_key("package.json") {
        let has_script = package_scripts(files)
            .and_then(|s| s.get("test").and_then(Value::as_str).map(str::to_string))
            .is_some_and(|script| !script.contains(NPM_DEFAULT_TEST));
        if has_script {
            return Some(CommandSpec::new("npm").arg("test"));
        }

        let js_tests = test_files(files, &[Language::JavaScript, Language::TypeScript]);
        if !js_tests.is_empty() {
            if package_mentions(files, "jest") {
                return Some(CommandSpec::new("npx").arg("jest").args(js_tests));
            }
            if package_mentions(files, "mocha") {
                return Some(CommandSpec::new("npx").arg("mocha").args(js_tests));
            }
            return Some(CommandSpec::new("npm").arg("test"));
        }
    }

    if files.contains_key("Cargo.toml") {
        return Some(CommandSpec::new("cargo").args(["test", "--quiet"]));
    }
    if files.contains_key("go.mod") {
        return Some(CommandSpec::new("go").args(["test", "./..."]));
    }

    let py_tests = test_files(files, &[Language::Python]);
    if !py_tests.is_empty() {
        return Some(CommandSpec::new("pytest").args(py_tests).arg("-v"));
    }

    None
}
