//! Best-effort test summary extraction from runner output.

use regex::Regex;
use std::sync::OnceLock;

/// Summary used when no known runner format is recognized.
pub const UNKNOWN_SUMMARY: &str = "See output for details";

struct Patterns {
    cargo: Regex,
    go_ok: Regex,
    go_fail: Regex,
    jest_fail: Regex,
    jest_all_fail: Regex,
    jest_pass: Regex,
    vitest_fail: Regex,
    vitest_pass: Regex,
    pytest_mixed: Regex,
    pytest_fail: Regex,
    pytest_pass: Regex,
    mocha: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                cargo: Regex::new(r"test result: (?:ok|FAILED)\. (\d+) passed; (\d+) failed").ok()?,
                go_ok: Regex::new(r"(?m)^ok\s+\S+\s+(?:[\d.]+s|\(cached\))").ok()?,
                go_fail: Regex::new(r"(?m)^FAIL\s+\S+\s+[\d.]+s").ok()?,
                jest_fail: Regex::new(r"Tests:\s+(\d+)\s+failed,\s+(?:\d+\s+\w+,\s+)*?(\d+)\s+passed,\s+(\d+)\s+total").ok()?,
                jest_all_fail: Regex::new(r"Tests:\s+(\d+)\s+failed,\s+(\d+)\s+total").ok()?,
                jest_pass: Regex::new(r"Tests:\s+(?:\d+\s+\w+,\s+)*?(\d+)\s+passed,\s+(\d+)\s+total").ok()?,
                vitest_fail: Regex::new(r"Tests\s+(\d+)\s+failed\s*\|\s*(\d+)\s+passed\s*\((\d+)\)").ok()?,
                vitest_pass: Regex::new(r"Tests\s+(\d+)\s+passed\s*\((\d+)\)").ok()?,
                pytest_mixed: Regex::new(r"(\d+)\s+failed,\s+(\d+)\s+passed").ok()?,
                pytest_fail: Regex::new(r"(\d+)\s+failed\b").ok()?,
                pytest_pass: Regex::new(r"(\d+)\s+passed").ok()?,
                mocha: Regex::new(r"(\d+)\s+passing(?:[\s\S]*?(\d+)\s+failing)?").ok()?,
            })
        })
        .as_ref()
}

fn group(caps: &regex::Captures<'_>, i: usize) -> u64 {
    caps.get(i)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Extract a one-line summary such as `"3 passed, 1 failed"`.
///
/// Recognizes Jest, Vitest, pytest, Mocha, `cargo test` and `go test`
/// output, then falls back to bare `PASS`/`FAIL` markers.
///
/// # Example
///
/// ```rust
/// use fixgate::sandbox::summary::{extract_summary, UNKNOWN_SUMMARY};
///
/// assert_eq!(extract_summary("===== 4 passed in 0.12s ====="), "4 passed");
/// assert_eq!(extract_summary("nothing useful"), UNKNOWN_SUMMARY);
/// ```
pub fn extract_summary(output: &str) -> String {
    let Some(p) = patterns() else {
        return UNKNOWN_SUMMARY.to_string();
    };

    // cargo prints one result line per test binary.
    let cargo: Vec<_> = p.cargo.captures_iter(output).collect();
    if !cargo.is_empty() {
        let passed: u64 = cargo.iter().map(|c| group(c, 1)).sum();
        let failed: u64 = cargo.iter().map(|c| group(c, 2)).sum();
        return format!("{} passed, {} failed", passed, failed);
    }

    let go_ok = p.go_ok.find_iter(output).count();
    let go_fail = p.go_fail.find_iter(output).count();
    if go_ok + go_fail > 0 {
        return format!("{} packages ok, {} failed", go_ok, go_fail);
    }

    if let Some(c) = p.jest_fail.captures(output) {
        return format!(
            "{} passed, {} failed, {} total",
            group(&c, 2),
            group(&c, 1),
            group(&c, 3)
        );
    }
    if let Some(c) = p.jest_all_fail.captures(output) {
        return format!("0 passed, {} failed, {} total", group(&c, 1), group(&c, 2));
    }
    if let Some(c) = p.jest_pass.captures(output) {
        return format!("{} passed, {} total", group(&c, 1), group(&c, 2));
    }

    if let Some(c) = p.vitest_fail.captures(output) {
        return format!(
            "{} passed, {} failed, {} total",
            group(&c, 2),
            group(&c, 1),
            group(&c, 3)
        );
    }
    if let Some(c) = p.vitest_pass.captures(output) {
        return format!("{} passed, {} total", group(&c, 1), group(&c, 2));
    }

    if let Some(c) = p.mocha.captures(output) {
        return match c.get(2) {
            Some(_) => format!("{} passing, {} failing", group(&c, 1), group(&c, 2)),
            None => format!("{} passing", group(&c, 1)),
        };
    }

    if let Some(c) = p.pytest_mixed.captures(output) {
        return format!("{} passed, {} failed", group(&c, 2), group(&c, 1));
    }
    if let Some(c) = p.pytest_pass.captures(output) {
        return format!("{} passed", group(&c, 1));
    }
    if let Some(c) = p.pytest_fail.captures(output) {
        return format!("0 passed, {} failed", group(&c, 1));
    }

    if output.contains("FAIL") {
        "Tests failed".to_string()
    } else if output.contains("PASS") {
        "Tests passed".to_string()
    } else {
        UNKNOWN_SUMMARY.to_string()
    }
}
