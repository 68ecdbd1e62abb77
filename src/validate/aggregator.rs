//! Runs every validation stage for one candidate fix and builds the report.
//!
//! Stage order is Patch, Syntax, Dependency, Build, Test. Syntax and
//! Dependency checks run per touched file on a bounded pool and are merged in
//! path order. Build runs only when the static stages produced no failures,
//! and Test only when Build did not fail.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::deps::{local_modules, DependencyCheck, DependencyChecker, Manifest, ManifestKind};
use super::report::{CheckEntry, CheckKind, ReportBuilder, ValidationReport};
use super::syntax::{SyntaxCheck, SyntaxError, SyntaxResult, SyntaxValidator};
use crate::config::FixgateConfig;
use crate::fix::{apply_fix, CandidateSet, FixSpec};
use crate::language::Language;
use crate::sandbox::{
    detect_build_command, detect_test_command, CommandSpec, InstallStatus, ProcessSandbox, Sandbox,
    SandboxConfig, SandboxOutcome,
};
use crate::snapshot::Snapshot;

// ============================================================================
// Options
// ============================================================================

/// Tunables for an [`Aggregator`].
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    pub max_parallel_checks: usize,
    /// Explicit build command. Auto-detected when `None`.
    pub build_command: Option<CommandSpec>,
    /// Explicit test command. Auto-detected when `None`.
    pub test_command: Option<CommandSpec>,
    pub build_timeout: Duration,
    pub test_timeout: Duration,
    /// Characters of captured output kept per entry.
    pub output_excerpt_chars: usize,
    /// Run Build and Test at all.
    pub run_sandbox: bool,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self::from(&FixgateConfig::default())
    }
}

impl From<&FixgateConfig> for AggregatorOptions {
    fn from(config: &FixgateConfig) -> Self {
        Self {
            max_parallel_checks: config.max_parallel_checks.max(1),
            build_command: config
                .build_command
                .as_deref()
                .and_then(|argv| CommandSpec::from_argv(argv)),
            test_command: config
                .test_command
                .as_deref()
                .and_then(|argv| CommandSpec::from_argv(argv)),
            build_timeout: config.build_timeout(),
            test_timeout: config.test_timeout(),
            output_excerpt_chars: config.output_excerpt_chars,
            run_sandbox: true,
        }
    }
}

// ============================================================================
// Per-file static results
// ============================================================================

#[derive(Debug, Clone)]
enum ManifestState {
    Parsed(Arc<Manifest>),
    Invalid { path: String, message: String },
    Absent { file_name: &'static str },
}

#[derive(Debug)]
enum DependencyOutcome {
    NotApplicable,
    NoManifest { file_name: &'static str },
    /// Reported once on the manifest itself.
    InvalidManifest,
    Checked { manifest: String, missing: Vec<String> },
}

#[derive(Debug)]
struct FileCheck {
    path: String,
    syntax: SyntaxResult,
    deps: DependencyOutcome,
}

// ============================================================================
// Aggregator
// ============================================================================

/// Validation pipeline with injected collaborators.
#[derive(Clone)]
pub struct Aggregator {
    syntax: Arc<dyn SyntaxCheck>,
    deps: Arc<dyn DependencyCheck>,
    sandbox: Arc<dyn Sandbox>,
    options: AggregatorOptions,
}

impl Aggregator {
    pub fn new(
        syntax: Arc<dyn SyntaxCheck>,
        deps: Arc<dyn DependencyCheck>,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        Self {
            syntax,
            deps,
            sandbox,
            options: AggregatorOptions::default(),
        }
    }

    /// Production collaborators configured from `config`.
    pub fn from_config(config: &FixgateConfig) -> Self {
        Self::new(
            Arc::new(SyntaxValidator::new().with_max_errors(config.max_syntax_errors_per_file)),
            Arc::new(DependencyChecker),
            Arc::new(ProcessSandbox::new(SandboxConfig::from(config))),
        )
        .with_options(AggregatorOptions::from(config))
    }

    #[must_use]
    pub fn with_options(mut self, options: AggregatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// Validate `fix` against `snapshot`.
    ///
    /// `manifest` overrides manifest discovery for its kind. If the fix
    /// modifies or creates that manifest, the patched content is used instead.
    pub async fn evaluate(
        &self,
        fix: &FixSpec,
        snapshot: &Snapshot,
        manifest: Option<&Manifest>,
    ) -> ValidationReport {
        let start = Instant::now();
        let mut report = ReportBuilder::new();

        // Patch
        let candidate = apply_fix(fix, snapshot);
        record_patch(&mut report, fix, &candidate);
        info!(
            touched = candidate.touched.len(),
            failed = candidate.failures.len(),
            "Patch stage complete"
        );

        // Syntax + Dependency
        let (checks, manifest_warnings) = self.run_static_checks(&candidate, manifest).await;
        for check in checks {
            record_static(&mut report, check);
        }
        for warning in manifest_warnings {
            report.warn(warning);
        }
        info!(failed = report.has_failures(), "Static checks complete");

        // Build + Test
        if !self.options.run_sandbox {
            debug!("Sandbox stages disabled");
        } else if report.has_failures() {
            report.warn(CheckEntry::new(
                CheckKind::Build,
                "build and tests skipped because earlier checks failed",
            ));
        } else {
            let build_failed = self.run_build(&mut report, &candidate.files).await;
            if build_failed {
                report.warn(CheckEntry::new(
                    CheckKind::Test,
                    "tests skipped because the build failed",
                ));
            } else {
                self.run_tests(&mut report, &candidate.files).await;
            }
        }

        let report = report.finish(start.elapsed());
        info!(
            passed = report.summary.passed,
            failed = report.summary.failed,
            warnings = report.summary.warnings,
            duration_ms = report.summary.duration_ms,
            "Validation complete"
        );
        report
    }

    async fn run_static_checks(
        &self,
        candidate: &CandidateSet,
        manifest: Option<&Manifest>,
    ) -> (Vec<FileCheck>, Vec<CheckEntry>) {
        let manifests = resolve_manifests(candidate, manifest);
        let file_paths: Vec<&str> = candidate.files.keys().map(String::as_str).collect();
        let locals: BTreeMap<Language, Arc<BTreeSet<String>>> = [Language::Python, Language::Rust]
            .into_iter()
            .map(|lang| (lang, Arc::new(local_modules(file_paths.iter().copied(), lang))))
            .collect();

        let tasks = candidate.touched.iter().map(|path| {
            let path = path.clone();
            let content = candidate.files.get(&path).cloned().unwrap_or_default();
            let language = Language::from_path(&path);
            let manifest_state = language
                .and_then(ManifestKind::for_language)
                .and_then(|kind| manifests.get(&kind).cloned());
            let local = language
                .and_then(|l| locals.get(&l).cloned())
                .unwrap_or_default();
            let syntax = Arc::clone(&self.syntax);
            let deps = Arc::clone(&self.deps);

            async move {
                let task_path = path.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let syntax_result = syntax.validate(&task_path, &content);
                    let deps_outcome = match (language, manifest_state) {
                        (Some(lang), Some(ManifestState::Parsed(m))) => DependencyOutcome::Checked {
                            manifest: m.path.clone(),
                            missing: deps.check(&content, &m, lang, &local),
                        },
                        (_, Some(ManifestState::Invalid { .. })) => DependencyOutcome::InvalidManifest,
                        (_, Some(ManifestState::Absent { file_name })) => {
                            DependencyOutcome::NoManifest { file_name }
                        }
                        _ => DependencyOutcome::NotApplicable,
                    };
                    (syntax_result, deps_outcome)
                })
                .await;

                match joined {
                    Ok((syntax, deps)) => FileCheck { path, syntax, deps },
                    Err(e) => {
                        warn!(path = %path, error = %e, "Static check task failed");
                        FileCheck {
                            syntax: SyntaxResult {
                                ok: false,
                                errors: vec![SyntaxError {
                                    line: 1,
                                    message: format!("syntax check crashed: {}", e),
                                }],
                                skipped: false,
                                total_errors: 1,
                            },
                            path,
                            deps: DependencyOutcome::NotApplicable,
                        }
                    }
                }
            }
        });

        let checks: Vec<FileCheck> = stream::iter(tasks)
            .buffered(self.options.max_parallel_checks.max(1))
            .collect()
            .await;

        let manifest_warnings = manifests
            .values()
            .filter_map(|state| match state {
                ManifestState::Invalid { path, message } => {
                    warn!(manifest = %path, "Manifest could not be parsed");
                    Some(CheckEntry::for_file(
                        CheckKind::Dependency,
                        path,
                        format!("manifest could not be parsed; dependency checks skipped: {}", message),
                    ))
                }
                _ => None,
            })
            .collect();

        (checks, manifest_warnings)
    }

    /// Returns true if the build failed.
    async fn run_build(&self, report: &mut ReportBuilder, files: &Snapshot) -> bool {
        let command = self
            .options
            .build_command
            .clone()
            .or_else(|| detect_build_command(files));
        let Some(command) = command else {
            report.warn(CheckEntry::new(
                CheckKind::Build,
                "no build command detected; build skipped",
            ));
            return false;
        };
        let command = command.with_timeout(self.options.build_timeout);

        info!(command = %command, "Running build");
        match self.sandbox.run(files, &command).await {
            Ok(outcome) => self.record_sandbox(report, CheckKind::Build, &command, &outcome),
            Err(e) => {
                report.fail(CheckEntry::new(
                    CheckKind::Build,
                    format!("sandbox error while running `{}`: {}", command, e),
                ));
                true
            }
        }
    }

    async fn run_tests(&self, report: &mut ReportBuilder, files: &Snapshot) {
        let command = self
            .options
            .test_command
            .clone()
            .or_else(|| detect_test_command(files));
        let Some(command) = command else {
            report.warn(CheckEntry::new(
                CheckKind::Test,
                "no test command detected; tests skipped",
            ));
            return;
        };
        let command = command.with_timeout(self.options.test_timeout);

        info!(command = %command, "Running tests");
        match self.sandbox.run_tests(files, &command).await {
            Ok(outcome) => {
                self.record_sandbox(report, CheckKind::Test, &command, &outcome);
            }
            Err(e) => report.fail(CheckEntry::new(
                CheckKind::Test,
                format!("sandbox error while running `{}`: {}", command, e),
            )),
        }
    }

    /// Record a sandbox outcome. Returns true if it failed.
    fn record_sandbox(
        &self,
        report: &mut ReportBuilder,
        kind: CheckKind,
        command: &CommandSpec,
        outcome: &SandboxOutcome,
    ) -> bool {
        let detail = excerpt(&outcome.combined_output(), self.options.output_excerpt_chars);

        if let InstallStatus::Skipped { reason } = &outcome.install {
            report.warn(CheckEntry::new(
                CheckKind::Install,
                format!("dependencies not installed: {}", reason),
            ));
        }

        if outcome.failed_at_install() {
            let message = if outcome.timed_out {
                "dependency installation timed out".to_string()
            } else {
                "dependency installation failed".to_string()
            };
            report.fail(CheckEntry::new(CheckKind::Install, message).with_detail(detail));
            return true;
        }

        let suffix = outcome
            .summary
            .as_deref()
            .map(|s| format!(" ({})", s))
            .unwrap_or_default();

        if outcome.success {
            let verb = if kind == CheckKind::Test { "passed" } else { "succeeded" };
            report.pass(CheckEntry::new(kind, format!("`{}` {}{}", command, verb, suffix)));
            return false;
        }

        let message = if outcome.timed_out {
            format!("`{}` timed out after {}s", command, command.timeout.as_secs())
        } else {
            match outcome.exit_code {
                Some(code) => format!("`{}` exited with code {}{}", command, code, suffix),
                None => format!("`{}` did not complete{}", command, suffix),
            }
        };
        report.fail(CheckEntry::new(kind, message).with_detail(detail));
        true
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn record_patch(report: &mut ReportBuilder, fix: &FixSpec, candidate: &CandidateSet) {
    for failure in &candidate.failures {
        report.fail(CheckEntry::for_file(
            CheckKind::Patch,
            &failure.path,
            failure.error.to_string(),
        ));
    }

    let counts: BTreeMap<&str, usize> = fix
        .grouped_changes()
        .into_iter()
        .map(|(path, changes)| (path, changes.len()))
        .collect();
    for path in &candidate.touched {
        let message = if candidate.created.contains(path) {
            "created".to_string()
        } else {
            let n = counts.get(path.as_str()).copied().unwrap_or(0);
            format!("applied {} change{}", n, if n == 1 { "" } else { "s" })
        };
        report.pass(CheckEntry::for_file(CheckKind::Patch, path, message));
    }
}

fn record_static(report: &mut ReportBuilder, check: FileCheck) {
    let FileCheck { path, syntax, deps } = check;

    if syntax.skipped {
        report.warn(CheckEntry::for_file(
            CheckKind::Syntax,
            &path,
            "no syntax checker for this file type; skipped",
        ));
    } else if syntax.ok {
        report.pass(CheckEntry::for_file(CheckKind::Syntax, &path, "parses"));
    } else {
        for error in &syntax.errors {
            report.fail(
                CheckEntry::for_file(CheckKind::Syntax, &path, &error.message).with_line(error.line),
            );
        }
        if syntax.total_errors > syntax.errors.len() {
            report.warn(CheckEntry::for_file(
                CheckKind::Syntax,
                &path,
                format!(
                    "{} more syntax errors not shown",
                    syntax.total_errors - syntax.errors.len()
                ),
            ));
        }
    }

    match deps {
        DependencyOutcome::NotApplicable | DependencyOutcome::InvalidManifest => {}
        DependencyOutcome::NoManifest { file_name } => report.warn(CheckEntry::for_file(
            CheckKind::Dependency,
            &path,
            format!("no {} found; dependency check skipped", file_name),
        )),
        DependencyOutcome::Checked { manifest, missing } => {
            if missing.is_empty() {
                report.pass(CheckEntry::for_file(
                    CheckKind::Dependency,
                    &path,
                    "all imports declared",
                ));
            }
            for module in missing {
                report.fail(CheckEntry::for_file(
                    CheckKind::Dependency,
                    &path,
                    format!("missing dependency `{}` (not declared in {})", module, manifest),
                ));
            }
        }
    }
}

/// Decide which manifest to use for each kind the candidate files need.
fn resolve_manifests(
    candidate: &CandidateSet,
    explicit: Option<&Manifest>,
) -> BTreeMap<ManifestKind, ManifestState> {
    let kinds: BTreeSet<ManifestKind> = candidate
        .touched
        .iter()
        .filter_map(|p| Language::from_path(p))
        .filter_map(ManifestKind::for_language)
        .collect();

    kinds
        .into_iter()
        .map(|kind| {
            let explicit = explicit.filter(|m| m.kind == kind);
            let path = explicit
                .map(|m| m.path.clone())
                .unwrap_or_else(|| kind.file_name().to_string());

            let from_content = |content: &str| match Manifest::parse(&path, content) {
                Ok(m) => ManifestState::Parsed(Arc::new(m)),
                Err(e) => ManifestState::Invalid {
                    path: path.clone(),
                    message: e.to_string(),
                },
            };

            let state = if candidate.touched.contains(&path) {
                debug!(manifest = %path, "Using manifest content from the fix");
                candidate
                    .files
                    .get(&path)
                    .map(|c| from_content(c))
                    .unwrap_or(ManifestState::Absent {
                        file_name: kind.file_name(),
                    })
            } else if let Some(m) = explicit {
                ManifestState::Parsed(Arc::new(m.clone()))
            } else if let Some(content) = candidate.files.get(&path) {
                from_content(content)
            } else {
                ManifestState::Absent {
                    file_name: kind.file_name(),
                }
            };
            (kind, state)
        })
        .collect()
}

/// Keep the tail of `output`, where tools print their errors.
fn excerpt(output: &str, max_chars: usize) -> String {
    let trimmed = output.trim_end();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - max_chars).collect();
    format!("...\n{}", tail)
}
