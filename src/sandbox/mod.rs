//! Isolated build and test execution.
//!
//! Each run materializes the candidate files into a fresh, uniquely named
//! temporary directory, optionally installs manifest dependencies, runs one
//! declarative command under a hard timeout and removes the directory again.
//! The directory is owned by a [`tempfile::TempDir`], so it is removed on
//! every exit path including cancellation of the awaiting task. Child
//! processes are started in their own process group; the whole group is
//! killed on timeout or cancellation.

pub mod detect;
pub mod summary;

pub use detect::{detect_build_command, detect_test_command, is_test_file};
pub use summary::{extract_summary, UNKNOWN_SUMMARY};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::FixgateConfig;
use crate::error::{FixgateError, Result};
use crate::snapshot::Snapshot;

/// Directory pip installs into when `requirements.txt` is present.
pub const PYTHON_DEPS_DIR: &str = ".fixgate-deps";

// ============================================================================
// Command Specification
// ============================================================================

/// A declarative command: never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Directory relative to the sandbox root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default = "default_command_timeout", with = "duration_secs")]
    pub timeout: Duration,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: default_command_timeout(),
            env: BTreeMap::new(),
        }
    }

    /// Build from an argv array. `None` if empty.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        let program = program.as_ref().trim();
        if program.is_empty() {
            return None;
        }
        Some(Self::new(program).args(args.iter().map(|a| a.as_ref().to_string())))
    }

    /// Split a command line on whitespace. Quoting is not supported.
    pub fn parse(line: &str) -> Option<Self> {
        let argv: Vec<&str> = line.split_whitespace().collect();
        Self::from_argv(&argv)
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Which step of a sandbox run decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxStage {
    Install,
    Command,
}

/// What happened to dependency installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallStatus {
    /// No manifest, or installation disabled.
    NotNeeded,
    /// The install tool is not available.
    Skipped { reason: String },
    Succeeded,
    Failed,
}

/// Result of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// `None` when killed by a signal, timed out or never started.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stage: SandboxStage,
    pub install: InstallStatus,
    pub duration_ms: u64,
    /// Test summary, set by [`Sandbox::run_tests`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SandboxOutcome {
    /// Combined stdout and stderr.
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
        }
    }

    /// Whether the run failed during dependency installation.
    pub fn failed_at_install(&self) -> bool {
        !self.success && self.stage == SandboxStage::Install
    }
}

// ============================================================================
// Sandbox trait
// ============================================================================

/// Runs commands against a set of files in isolation.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Materialize `files`, run `command` and tear everything down.
    ///
    /// Command failures and timeouts are reported in the outcome; `Err` is
    /// reserved for sandbox setup failures.
    async fn run(&self, files: &Snapshot, command: &CommandSpec) -> Result<SandboxOutcome>;

    /// Like [`run`](Sandbox::run), also extracting a test summary.
    async fn run_tests(&self, files: &Snapshot, command: &CommandSpec) -> Result<SandboxOutcome> {
        let mut outcome = self.run(files, command).await?;
        if outcome.stage == SandboxStage::Command {
            outcome.summary = Some(extract_summary(&outcome.combined_output()));
        }
        Ok(outcome)
    }
}

/// Settings for [`ProcessSandbox`].
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Parent of sandbox directories. System temp dir when `None`.
    pub root: Option<PathBuf>,
    pub install_dependencies: bool,
    pub install_timeout: Duration,
    /// Search path for install tools. Inherits `PATH` when `None`.
    pub tool_path: Option<OsString>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: None,
            install_dependencies: true,
            install_timeout: Duration::from_secs(180),
            tool_path: None,
        }
    }
}

impl From<&FixgateConfig> for SandboxConfig {
    fn from(config: &FixgateConfig) -> Self {
        Self {
            root: config.sandbox_root.clone(),
            install_dependencies: config.install_dependencies,
            install_timeout: config.install_timeout(),
            tool_path: None,
        }
    }
}

/// [`Sandbox`] backed by real temporary directories and subprocesses.
#[derive(Debug, Clone, Default)]
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn create_dir(&self) -> Result<tempfile::TempDir> {
        let prefix = format!("fixgate-{}-", uuid::Uuid::new_v4().simple());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match &self.config.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        };
        dir.map_err(|e| FixgateError::sandbox(format!("failed to create sandbox directory: {}", e)))
    }

    fn find_tool(&self, tool: &str, cwd: &Path) -> Option<PathBuf> {
        match &self.config.tool_path {
            Some(paths) => which::which_in(tool, Some(paths), cwd).ok(),
            None => which::which(tool).ok(),
        }
    }

    /// Install manifest dependencies. Returns the failing outcome, if any.
    async fn install(
        &self,
        dir: &Path,
        files: &Snapshot,
        env: &mut BTreeMap<String, String>,
    ) -> (InstallStatus, Option<ProcessOutput>) {
        if !self.config.install_dependencies {
            return (InstallStatus::NotNeeded, None);
        }

        let node = files.contains_key("package.json");
        let (tools, args): (&[&str], &[&str]) = if node {
            (&["npm"], &["install", "--legacy-peer-deps", "--no-audit", "--no-fund"])
        } else if files.contains_key("requirements.txt") {
            (
                &["pip3", "pip"],
                &[
                    "install",
                    "-r",
                    "requirements.txt",
                    "--target",
                    PYTHON_DEPS_DIR,
                    "--quiet",
                    "--disable-pip-version-check",
                ],
            )
        } else {
            return (InstallStatus::NotNeeded, None);
        };

        let Some(program) = tools.iter().find_map(|tool| self.find_tool(tool, dir)) else {
            return skipped(&tools.join("/"));
        };
        if !node {
            env.insert(
                "PYTHONPATH".to_string(),
                dir.join(PYTHON_DEPS_DIR).display().to_string(),
            );
        }

        info!(tool = %program.display(), "Installing dependencies in sandbox");
        let spec = CommandSpec::new(program.display().to_string())
            .args(args.iter().copied())
            .with_timeout(self.config.install_timeout);
        match execute(&spec, dir, &BTreeMap::new()).await {
            Ok(output) if output.success() => (InstallStatus::Succeeded, None),
            Ok(output) => (InstallStatus::Failed, Some(output)),
            Err(e) => {
                warn!(tool = %program.display(), error = %e, "Dependency installation could not start");
                (
                    InstallStatus::Failed,
                    Some(ProcessOutput::not_started(e.to_string())),
                )
            }
        }
    }
}

fn skipped(tool: &str) -> (InstallStatus, Option<ProcessOutput>) {
    warn!(tool, "Install tool not found, skipping dependency installation");
    (
        InstallStatus::Skipped {
            reason: format!("{} not found", tool),
        },
        None,
    )
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn run(&self, files: &Snapshot, command: &CommandSpec) -> Result<SandboxOutcome> {
        let start = Instant::now();
        let dir = self.create_dir()?;
        debug!(dir = %dir.path().display(), files = files.len(), "Created sandbox");

        for (path, content) in files {
            let target = safe_join(dir.path(), path)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content).await?;
        }

        let mut env = BTreeMap::new();
        let (install, failure) = self.install(dir.path(), files, &mut env).await;

        let (stage, output) = match failure {
            Some(output) => (SandboxStage::Install, output),
            None => {
                let cwd = match &command.working_dir {
                    Some(sub) => safe_join(dir.path(), sub)?,
                    None => dir.path().to_path_buf(),
                };
                info!(command = %command, "Running sandboxed command");
                let output = match execute(command, &cwd, &env).await {
                    Ok(output) => output,
                    Err(e) => ProcessOutput::not_started(format!(
                        "failed to start `{}`: {}",
                        command.program, e
                    )),
                };
                (SandboxStage::Command, output)
            }
        };

        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!(dir = %path.display(), error = %e, "Failed to remove sandbox directory");
        }

        let outcome = SandboxOutcome {
            success: output.success(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            stage,
            install,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            summary: None,
        };
        debug!(
            success = outcome.success,
            timed_out = outcome.timed_out,
            exit_code = ?outcome.exit_code,
            duration_ms = outcome.duration_ms,
            "Sandbox run finished"
        );
        Ok(outcome)
    }
}

/// Join a relative path onto `root`, rejecting anything that could escape it.
pub fn safe_join(root: &Path, relative: &str) -> Result<PathBuf> {
    let unsafe_path = || FixgateError::UnsafePath {
        path: relative.to_string(),
    };
    if relative.is_empty() || relative.starts_with(['/', '\\']) || relative.contains(':') {
        return Err(unsafe_path());
    }

    let mut joined = root.to_path_buf();
    for component in Path::new(&relative.replace('\\', "/")).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            _ => return Err(unsafe_path()),
        }
    }
    if joined == root {
        return Err(unsafe_path());
    }
    Ok(joined)
}

// ============================================================================
// Process execution
// ============================================================================

struct ProcessOutput {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    timed_out: bool,
}

impl ProcessOutput {
    fn not_started(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            exit_code: None,
            timed_out: false,
        }
    }

    fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Kills a child's whole process group when dropped, unless disarmed.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    debug!(pgid, "Killing sandbox process group");
    let _ = std::process::Command::new("kill")
        .args(["-KILL", &format!("-{}", pgid)])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

async fn execute(
    spec: &CommandSpec,
    cwd: &Path,
    extra_env: &BTreeMap<String, String>,
) -> anyhow::Result<ProcessOutput> {
    use anyhow::Context;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(cwd)
        .env("CI", "true")
        .envs(extra_env)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = command
        .spawn()
        .with_context(|| format!("failed to spawn {}", spec.program))?;
    let mut guard = ProcessGroupGuard { pgid: child.id() };

    match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output.context("failed to collect process output")?;
            guard.disarm();
            Ok(ProcessOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                timed_out: false,
            })
        }
        Err(_) => {
            warn!(
                command = %spec,
                timeout_secs = spec.timeout.as_secs(),
                "Sandboxed command timed out"
            );
            drop(guard);
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: format!("timed out after {}s", spec.timeout.as_secs()),
                exit_code: None,
                timed_out: true,
            })
        }
    }
}
