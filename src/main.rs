//! fixgate - validation gate for machine-proposed code fixes
//!
//! Applies, validates and retries structured fixes from the command line.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use fixgate::snapshot::{self, Snapshot};
use fixgate::{
    apply_fix, Aggregator, CheckEntry, CommandFixGenerator, CommandSpec, FixSpec, FixgateConfig,
    FixgateError, Manifest, Orchestrator, RetrySession, SessionOutcome, SessionStatus,
    ValidationReport,
};

/// Exit code when a session runs out of attempts.
const EXIT_EXHAUSTED: i32 = 3;

#[derive(Parser)]
#[command(name = "fixgate")]
#[command(version)]
#[command(about = "Apply and validate machine-proposed code fixes with bounded retries", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a fix to a snapshot and write the patched files
    Apply {
        /// Fix JSON (bare, fenced or surrounded by prose)
        #[arg(long)]
        fix: PathBuf,

        /// Snapshot directory (defaults to the project directory)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Directory the patched and created files are written to
        #[arg(long)]
        out: PathBuf,
    },

    /// Validate a fix and print the report
    Validate {
        /// Fix JSON (bare, fenced or surrounded by prose)
        #[arg(long)]
        fix: PathBuf,

        /// Snapshot directory (defaults to the project directory)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Manifest to check imports against instead of the snapshot's own
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Build command, e.g. "npm run build"
        #[arg(long, value_name = "ARGV")]
        build_cmd: Option<String>,

        /// Test command, e.g. "pytest -q"
        #[arg(long, value_name = "ARGV")]
        test_cmd: Option<String>,

        /// Skip the build and test stages
        #[arg(long)]
        no_sandbox: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a full generate-validate-retry session for one issue
    Session {
        /// File with the issue description and context
        #[arg(long)]
        issue: PathBuf,

        /// Generator program; receives the request JSON on stdin
        #[arg(long, value_name = "ARGV")]
        generator: String,

        /// Generator timeout in seconds
        #[arg(long, default_value = "600", value_name = "SECS")]
        generator_timeout: u64,

        /// Snapshot directory (defaults to the project directory)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Manifest to check imports against instead of the snapshot's own
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Build command, e.g. "npm run build"
        #[arg(long, value_name = "ARGV")]
        build_cmd: Option<String>,

        /// Test command, e.g. "pytest -q"
        #[arg(long, value_name = "ARGV")]
        test_cmd: Option<String>,

        /// Where session.json is written (defaults to <project>/.fixgate)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let fixgate_error = e.downcast_ref::<FixgateError>();
            if fixgate_error.is_some_and(FixgateError::is_recoverable) {
                eprintln!("   This may be transient; running the command again can succeed.");
            }
            std::process::exit(fixgate_error.map(FixgateError::exit_code).unwrap_or(1));
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "fixgate=debug,info"
    } else {
        "fixgate=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        return Err(anyhow!(
            "Project directory does not exist: {}",
            project_path.display()
        ));
    }

    match cli.command {
        Commands::Apply { fix, snapshot, out } => {
            let snapshot_dir = snapshot.unwrap_or_else(|| project_path.clone());
            let files = snapshot::load_dir(&snapshot_dir)?;
            let fix = read_fix(&fix)?;

            let candidate = apply_fix(&fix, &files);
            if !candidate.is_clean() {
                for failure in &candidate.failures {
                    eprintln!("{} {}: {}", "FAIL".red().bold(), failure.path, failure.error);
                }
                return Ok(1);
            }

            let written = snapshot::write_dir(
                &out,
                candidate
                    .touched
                    .iter()
                    .filter_map(|path| candidate.files.get_key_value(path)),
            )?;
            println!(
                "{} Wrote {} file(s) to {}",
                "OK".green().bold(),
                written,
                out.display()
            );
            Ok(0)
        }

        Commands::Validate {
            fix,
            snapshot,
            manifest,
            build_cmd,
            test_cmd,
            no_sandbox,
            json,
        } => {
            let config = load_config(&project_path, build_cmd.as_deref(), test_cmd.as_deref())?;
            let snapshot_dir = snapshot.unwrap_or_else(|| project_path.clone());
            let files = snapshot::load_dir(&snapshot_dir)?;
            let manifest = manifest
                .map(|path| load_manifest(&path, &snapshot_dir))
                .transpose()?;
            let fix = read_fix(&fix)?;

            let aggregator = Aggregator::from_config(&config);
            let mut options = aggregator.options().clone();
            options.run_sandbox = !no_sandbox;
            let aggregator = aggregator.with_options(options);

            let report = aggregator.evaluate(&fix, &files, manifest.as_ref()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(if report.passed() { 0 } else { 1 })
        }

        Commands::Session {
            issue,
            generator,
            generator_timeout,
            snapshot,
            manifest,
            build_cmd,
            test_cmd,
            output_dir,
        } => {
            let config = load_config(&project_path, build_cmd.as_deref(), test_cmd.as_deref())?;
            let issue_context = std::fs::read_to_string(&issue)
                .with_context(|| format!("failed to read issue file {}", issue.display()))?;
            let snapshot_dir = snapshot.unwrap_or_else(|| project_path.clone());
            let files: Snapshot = snapshot::load_dir(&snapshot_dir)?;
            let manifest = manifest
                .map(|path| load_manifest(&path, &snapshot_dir))
                .transpose()?;

            let command = CommandSpec::parse(&generator)
                .ok_or_else(|| anyhow!("--generator must not be empty"))?
                .with_timeout(Duration::from_secs(generator_timeout));
            let generator = CommandFixGenerator::new(command).in_dir(&project_path);
            let orchestrator = Orchestrator::from_config(Arc::new(generator), &config);

            let mut session = RetrySession::new();
            let result = orchestrator
                .run_in(&mut session, &issue_context, &files, manifest.as_ref())
                .await;

            // Written even when the session aborts.
            let outcome = SessionOutcome::from_session(session);
            let output_dir = output_dir.unwrap_or_else(|| project_path.join(".fixgate"));
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("failed to create {}", output_dir.display()))?;
            let session_path = output_dir.join("session.json");
            std::fs::write(&session_path, serde_json::to_string_pretty(&outcome)?)?;

            print_session(&outcome, &session_path);
            result?;
            Ok(if outcome.succeeded() { 0 } else { EXIT_EXHAUSTED })
        }
    }
}

fn load_config(
    project: &Path,
    build_cmd: Option<&str>,
    test_cmd: Option<&str>,
) -> anyhow::Result<FixgateConfig> {
    let mut config = FixgateConfig::load(project)?;
    if let Some(line) = build_cmd {
        config.build_command = Some(parse_argv(line)?);
    }
    if let Some(line) = test_cmd {
        config.test_command = Some(parse_argv(line)?);
    }
    config.validate()?;
    Ok(config)
}

fn parse_argv(line: &str) -> anyhow::Result<Vec<String>> {
    CommandSpec::parse(line)
        .map(|spec| spec.argv())
        .ok_or_else(|| anyhow!("command must not be empty"))
}

fn read_fix(path: &Path) -> anyhow::Result<FixSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fix file {}", path.display()))?;
    Ok(FixSpec::parse_response(&text)?)
}

/// Parse a manifest, keyed by its path inside the snapshot when it lives there.
fn load_manifest(path: &Path, snapshot_dir: &Path) -> anyhow::Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;

    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let root = snapshot_dir
        .canonicalize()
        .unwrap_or_else(|_| snapshot_dir.to_path_buf());
    let key = absolute
        .strip_prefix(&root)
        .ok()
        .and_then(|rel| {
            let parts: Option<Vec<&str>> = rel.iter().map(|c| c.to_str()).collect();
            parts.map(|p| p.join("/"))
        })
        .or_else(|| path.file_name().and_then(|n| n.to_str()).map(String::from))
        .ok_or_else(|| anyhow!("invalid manifest path {}", path.display()))?;

    Ok(Manifest::parse(&key, &content)?)
}

fn print_entry(label: colored::ColoredString, entry: &CheckEntry, with_detail: bool) {
    println!("  {} {}", label, entry);
    if with_detail {
        if let Some(detail) = &entry.detail {
            for line in detail.lines().take(20) {
                println!("       {}", line.dimmed());
            }
        }
    }
}

fn print_report(report: &ValidationReport) {
    println!("\n{} Validation Report", "fixgate:".cyan().bold());
    println!("{}", "─".repeat(60));
    for entry in &report.checks_passed {
        print_entry("PASS".green(), entry, false);
    }
    for entry in &report.warnings {
        print_entry("WARN".yellow(), entry, false);
    }
    for entry in &report.checks_failed {
        print_entry("FAIL".red().bold(), entry, true);
    }
    println!("{}", "─".repeat(60));

    let verdict = if report.passed() {
        "PASSED".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!("{} ({})", verdict, report.summary);
}

fn print_session(outcome: &SessionOutcome, session_path: &Path) {
    println!("\n{} Fix Session", "fixgate:".cyan().bold());
    println!("{}", "─".repeat(60));
    for attempt in outcome.attempts() {
        let status = if attempt.validation_report.passed() {
            "PASS".green().bold()
        } else {
            "FAIL".red().bold()
        };
        println!(
            "  Attempt {}: {} ({})",
            attempt.number, status, attempt.validation_report.summary
        );
        for entry in &attempt.validation_report.checks_failed {
            println!("     {}", entry);
        }
    }
    println!("{}", "─".repeat(60));

    match outcome.status() {
        SessionStatus::Succeeded => println!(
            "{} Fix validated after {} attempt(s)",
            "OK".green().bold(),
            outcome.attempts().len()
        ),
        SessionStatus::Exhausted => println!(
            "{} All {} attempts failed. Manual review required.",
            "Warning:".yellow().bold(),
            outcome.attempts().len()
        ),
        SessionStatus::InProgress => println!(
            "{} Session aborted after {} attempt(s)",
            "Error:".red().bold(),
            outcome.attempts().len()
        ),
    }
    println!("   Session written to {}", session_path.display());
}
