//! Integration tests for the fixgate CLI

use assert_cmd::cargo;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// Get a Command for the fixgate binary
fn fixgate() -> Command {
    Command::new(cargo::cargo_bin!("fixgate"))
}

const APP_JS: &str = "const { Pool } = require('pg');\n\
                      const pool = new Pool({ max: 10 })\n\
                      module.exports = pool;\n";

/// A small Node project with dependency installation switched off.
fn node_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("app.js"), APP_JS).unwrap();
    std::fs::write(
        temp.path().join("package.json"),
        r#"{"name": "svc", "dependencies": {"pg": "^8.11.0"}}"#,
    )
    .unwrap();
    std::fs::create_dir_all(temp.path().join(".fixgate")).unwrap();
    std::fs::write(
        temp.path().join(".fixgate/settings.json"),
        r#"{"installDependencies": false, "buildTimeoutSecs": 20, "testTimeoutSecs": 20}"#,
    )
    .unwrap();
    temp
}

fn write_fix(dir: &Path, name: &str, old: &str, new: &str) -> std::path::PathBuf {
    let fix = serde_json::json!({
        "files_to_modify": [{
            "path": "app.js",
            "changes": [{"old_code": old, "new_code": new, "explanation": "raise pool size"}]
        }]
    });
    let path = dir.join(name);
    std::fs::write(&path, fix.to_string()).unwrap();
    path
}

fn good_fix(dir: &Path) -> std::path::PathBuf {
    write_fix(
        dir,
        "fix.json",
        "const pool = new Pool({ max: 10 })",
        "const pool = new Pool({ max: 20, timeout: 10000 })",
    )
}

#[test]
fn test_help() {
    fixgate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("session"));
}

#[test]
fn test_version() {
    fixgate()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_apply_writes_patched_file() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = good_fix(scratch.path());
    let out = scratch.path().join("out");

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("apply")
        .arg("--fix")
        .arg(&fix)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 file(s)"));

    let patched = std::fs::read_to_string(out.join("app.js")).unwrap();
    assert!(patched.contains("max: 20, timeout: 10000"));
    assert!(!out.join("package.json").exists());
    // The project itself is never modified.
    assert_eq!(std::fs::read_to_string(project.path().join("app.js")).unwrap(), APP_JS);
}

#[test]
fn test_apply_not_found_fails() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = write_fix(scratch.path(), "fix.json", "const pool = new Pool({ max: 99 })", "x");

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("apply")
        .arg("--fix")
        .arg(&fix)
        .arg("--out")
        .arg(scratch.path().join("out"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("old_code not found"));
}

#[test]
fn test_validate_static_only_passes() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = good_fix(scratch.path());

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("validate")
        .arg("--fix")
        .arg(&fix)
        .arg("--no-sandbox")
        .assert()
        .success()
        .stdout(predicate::str::contains("PASSED"));
}

#[test]
fn test_validate_json_reports_syntax_failure() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = write_fix(
        scratch.path(),
        "fix.json",
        "const pool = new Pool({ max: 10 })",
        "const pool = new Pool({ max: 20 ",
    );

    let output = fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("validate")
        .arg("--fix")
        .arg(&fix)
        .arg("--json")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let failed = report["checks_failed"].as_array().unwrap();
    assert!(failed.iter().any(|e| e["kind"] == "Syntax" && e["line"].is_number()));
}

#[test]
fn test_validate_missing_dependency() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = write_fix(
        scratch.path(),
        "fix.json",
        "const { Pool } = require('pg');",
        "const { Pool } = require('pg');\nconst retry = require('not-a-real-pkg');",
    );

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("validate")
        .arg("--fix")
        .arg(&fix)
        .arg("--no-sandbox")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("not-a-real-pkg"));
}

#[cfg(unix)]
#[test]
fn test_validate_runs_build_and_test_commands() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = good_fix(scratch.path());

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("validate")
        .arg("--fix")
        .arg(&fix)
        .arg("--build-cmd")
        .arg("grep -q timeout app.js")
        .arg("--test-cmd")
        .arg("true")
        .assert()
        .success()
        .stdout(predicate::str::contains("[Build]"))
        .stdout(predicate::str::contains("[Test]"));
}

#[cfg(unix)]
#[test]
fn test_validate_build_failure() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = good_fix(scratch.path());

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("validate")
        .arg("--fix")
        .arg(&fix)
        .arg("--build-cmd")
        .arg("false")
        .arg("--test-cmd")
        .arg("true")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("`false` exited with code 1"));
}

#[test]
fn test_validate_malformed_fix_exit_code() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = scratch.path().join("fix.json");
    std::fs::write(&fix, "I could not produce a fix").unwrap();

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("validate")
        .arg("--fix")
        .arg(&fix)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Malformed fix"));
}

#[cfg(unix)]
#[test]
fn test_session_succeeds_and_writes_session_json() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = good_fix(scratch.path());
    let issue = scratch.path().join("issue.md");
    std::fs::write(&issue, "Connection pool exhausted under load").unwrap();
    let out = scratch.path().join("out");

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("session")
        .arg("--issue")
        .arg(&issue)
        .arg("--generator")
        .arg(format!("cat {}", fix.display()))
        .arg("--build-cmd")
        .arg("true")
        .arg("--test-cmd")
        .arg("true")
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Fix validated after 1 attempt(s)"));

    let session: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("session.json")).unwrap()).unwrap();
    assert_eq!(session["session"]["status"], "Succeeded");
    assert_eq!(session["session"]["attempts"].as_array().unwrap().len(), 1);
    assert_eq!(session["manual_review_required"], false);
}

#[cfg(unix)]
#[test]
fn test_session_exhausts_with_exit_code_3() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = write_fix(scratch.path(), "fix.json", "not in app.js", "x");
    let issue = scratch.path().join("issue.md");
    std::fs::write(&issue, "Connection pool exhausted under load").unwrap();
    let out = scratch.path().join("out");

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("session")
        .arg("--issue")
        .arg(&issue)
        .arg("--generator")
        .arg(format!("cat {}", fix.display()))
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .code(3)
        .stdout(predicate::str::contains("Manual review required"));

    let session: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("session.json")).unwrap()).unwrap();
    assert_eq!(session["session"]["status"], "Exhausted");
    assert_eq!(session["session"]["attempts"].as_array().unwrap().len(), 3);
    assert_eq!(session["manual_review_required"], true);
}

#[cfg(unix)]
#[test]
fn test_session_aborted_by_malformed_fix_keeps_attempts() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let fix = write_fix(scratch.path(), "fix.json", "not in app.js", "x");
    let issue = scratch.path().join("issue.md");
    std::fs::write(&issue, "Connection pool exhausted under load").unwrap();
    // First call returns a fix, every later call returns prose.
    let marker = scratch.path().join("called");
    let script = scratch.path().join("gen.sh");
    std::fs::write(
        &script,
        format!(
            "if [ -f {marker} ]; then echo 'no fix'; else touch {marker}; cat {fix}; fi\n",
            marker = marker.display(),
            fix = fix.display()
        ),
    )
    .unwrap();
    let out = scratch.path().join("out");

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("session")
        .arg("--issue")
        .arg(&issue)
        .arg("--generator")
        .arg(format!("sh {}", script.display()))
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .code(4)
        .stdout(predicate::str::contains("Session aborted after 1 attempt(s)"));

    let session: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("session.json")).unwrap()).unwrap();
    assert_eq!(session["session"]["status"], "InProgress");
    assert_eq!(session["session"]["attempts"].as_array().unwrap().len(), 1);
}

#[cfg(unix)]
#[test]
fn test_session_generator_failure_is_recoverable() {
    let project = node_project();
    let scratch = TempDir::new().unwrap();
    let issue = scratch.path().join("issue.md");
    std::fs::write(&issue, "Connection pool exhausted under load").unwrap();

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("session")
        .arg("--issue")
        .arg(&issue)
        .arg("--generator")
        .arg("false")
        .arg("--output-dir")
        .arg(scratch.path().join("out"))
        .assert()
        .code(5)
        .stderr(predicate::str::contains("Fix generator failed"))
        .stderr(predicate::str::contains("running the command again can succeed"));
}

#[test]
fn test_invalid_settings_rejected() {
    let project = node_project();
    std::fs::write(
        project.path().join(".fixgate/settings.json"),
        r#"{"maxParallelChecks": 0}"#,
    )
    .unwrap();
    let scratch = TempDir::new().unwrap();
    let fix = good_fix(scratch.path());

    fixgate()
        .arg("--project")
        .arg(project.path())
        .arg("validate")
        .arg("--fix")
        .arg(&fix)
        .assert()
        .code(7);
}
