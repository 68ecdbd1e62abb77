//! Configuration for fixgate.
//!
//! Settings are read from `<project>/.fixgate/settings.json`. Every key is
//! optional; a missing file yields [`FixgateConfig::default`].
//!
//! # Example settings.json
//!
//! ```json
//! {
//!   "buildTimeoutSecs": 90,
//!   "testCommand": ["npm", "test", "--", "--ci"],
//!   "installDependencies": false,
//!   "feedback": { "maxEntries": 10 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FixgateError, Result};

/// Directories never loaded into a snapshot or copied into a sandbox.
pub fn default_ignore_dirs() -> HashSet<&'static str> {
    [
        "node_modules",
        ".next",
        "target",
        ".venv",
        "venv",
        "__pycache__",
        "dist",
        ".git",
        ".hg",
        ".svn",
        ".turbo",
        ".fixgate",
        ".fixgate-deps",
        "coverage",
        ".nyc_output",
        ".pytest_cache",
        ".mypy_cache",
        ".ruff_cache",
        "htmlcov",
        ".tox",
        ".eggs",
    ]
    .into_iter()
    .collect()
}

/// Lock files are regenerated by installs and never part of a snapshot.
pub fn default_ignore_files() -> HashSet<&'static str> {
    [
        "package-lock.json",
        "pnpm-lock.yaml",
        "yarn.lock",
        "poetry.lock",
        ".DS_Store",
        "thumbs.db",
    ]
    .into_iter()
    .collect()
}

/// Settings for the structured feedback sent back to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackConfig {
    /// Failed checks listed before the remainder is summarized.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

/// Project configuration loaded from .fixgate/settings.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixgateConfig {
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,

    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,

    /// Install manifest dependencies inside the sandbox before building.
    #[serde(default = "default_true")]
    pub install_dependencies: bool,

    /// Upper bound on concurrent per-file static checks.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_checks: usize,

    /// Explicit build argv. Auto-detected when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_command: Option<Vec<String>>,

    /// Explicit test argv. Auto-detected when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<Vec<String>>,

    /// Parent directory for sandboxes. System temp dir when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_root: Option<PathBuf>,

    #[serde(default = "default_max_syntax_errors")]
    pub max_syntax_errors_per_file: usize,

    /// Characters of build/test output kept in a report entry.
    #[serde(default = "default_excerpt_chars")]
    pub output_excerpt_chars: usize,

    #[serde(default)]
    pub feedback: FeedbackConfig,
}

fn default_true() -> bool {
    true
}

fn default_build_timeout() -> u64 {
    60
}

fn default_test_timeout() -> u64 {
    120
}

fn default_install_timeout() -> u64 {
    180
}

fn default_max_parallel() -> usize {
    4
}

fn default_max_syntax_errors() -> usize {
    20
}

fn default_excerpt_chars() -> usize {
    2000
}

fn default_max_entries() -> usize {
    25
}

impl Default for FixgateConfig {
    fn default() -> Self {
        Self {
            build_timeout_secs: default_build_timeout(),
            test_timeout_secs: default_test_timeout(),
            install_timeout_secs: default_install_timeout(),
            install_dependencies: true,
            max_parallel_checks: default_max_parallel(),
            build_command: None,
            test_command: None,
            sandbox_root: None,
            max_syntax_errors_per_file: default_max_syntax_errors(),
            output_excerpt_chars: default_excerpt_chars(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl FixgateConfig {
    /// Load configuration from a project directory.
    ///
    /// # Errors
    ///
    /// Returns [`FixgateError::Config`] if the file exists but cannot be read
    /// or parsed, and [`FixgateError::InvalidConfig`] if a value is out of range.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let settings_path = Self::settings_path(project_dir);

        if !settings_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&settings_path).map_err(|e| {
            FixgateError::config_with_path(format!("failed to read: {}", e), settings_path.clone())
        })?;
        let config: FixgateConfig = serde_json::from_str(&content).map_err(|e| {
            FixgateError::config_with_path(format!("failed to parse: {}", e), settings_path.clone())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the settings.json path for a project
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".fixgate/settings.json")
    }

    /// Reject values that would make the pipeline hang or stall.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("buildTimeoutSecs", self.build_timeout_secs as usize),
            ("testTimeoutSecs", self.test_timeout_secs as usize),
            ("installTimeoutSecs", self.install_timeout_secs as usize),
            ("maxParallelChecks", self.max_parallel_checks),
            ("maxSyntaxErrorsPerFile", self.max_syntax_errors_per_file),
            ("feedback.maxEntries", self.feedback.max_entries),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(FixgateError::invalid_config(field, "must be greater than zero"));
            }
        }

        for (field, argv) in [
            ("buildCommand", &self.build_command),
            ("testCommand", &self.test_command),
        ] {
            if let Some(argv) = argv {
                if argv.first().is_none_or(|program| program.trim().is_empty()) {
                    return Err(FixgateError::invalid_config(field, "program must not be empty"));
                }
            }
        }

        Ok(())
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}
