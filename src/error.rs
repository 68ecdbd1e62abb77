//! Custom error types for fixgate.
//!
//! Recoverable defects in a proposed fix (patch location, syntax, missing
//! dependencies, build and test failures) never surface as errors: they are
//! recorded in a [`ValidationReport`](crate::validate::ValidationReport).
//! The variants here cover the cases that end a generation round or a
//! session outright.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fixgate operations
#[derive(Error, Debug)]
pub enum FixgateError {
    // =========================================================================
    // Fix Payload Errors
    // =========================================================================
    /// The fix payload is structurally unusable (bad JSON or schema violation)
    #[error("Malformed fix: {reason}")]
    MalformedFix { reason: String },

    /// The fix-generation collaborator failed to produce a response
    #[error("Fix generator failed: {message}")]
    Generator { message: String },

    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    /// Sandbox setup or teardown failed
    #[error("Sandbox error: {message}")]
    Sandbox { message: String },

    /// A sandboxed file path is absolute or escapes the sandbox root
    #[error("Unsafe sandbox path: {path}")]
    UnsafePath { path: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Snapshot could not be loaded
    #[error("Snapshot error: {message}")]
    Snapshot { message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FixgateError {
    /// Create a malformed-fix error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFix {
            reason: reason.into(),
        }
    }

    /// Create a generator error
    pub fn generator(message: impl Into<String>) -> Self {
        Self::Generator {
            message: message.into(),
        }
    }

    /// Create a sandbox error
    pub fn sandbox(message: impl Into<String>) -> Self {
        Self::Sandbox {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a snapshot error
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }

    /// Check if retrying the same operation could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Generator { .. } | Self::Sandbox { .. })
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MalformedFix { .. } => 4,
            Self::Generator { .. } => 5,
            Self::Sandbox { .. } | Self::UnsafePath { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            Self::Snapshot { .. } => 8,
            _ => 1,
        }
    }
}

/// Type alias for fixgate results
pub type Result<T> = std::result::Result<T, FixgateError>;
