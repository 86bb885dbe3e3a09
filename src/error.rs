//! Error types for Telos.
//!
//! This module provides structured error handling with:
//! - Error codes for programmatic handling (E001-E069)
//! - CLI exit codes for scripting
//! - The [`bail_if!`] guard macro for early returns
//!
//! # Error Code Ranges
//!
//! | Range | Category |
//! |-------|----------|
//! | E001-E009 | Configuration errors |
//! | E010-E019 | Lifecycle state errors |
//! | E020-E029 | Generation backend errors |
//! | E030-E039 | Export/serialization errors |
//! | E040-E049 | I/O errors |
//! | E050-E059 | Cancellation |
//! | E060-E069 | Validation errors |
//!
//! Backend failures for a single test case are *not* represented here as a
//! fatal error: the fitness evaluator recovers them locally and records the
//! message in the test outcome. Only connection-level and protocol-level
//! failures surface as [`Error`] values.

use thiserror::Error;

// =============================================================================
// CLI EXIT CODES
// =============================================================================

/// Exit code for successful execution.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for configuration errors (invalid parameters, bad config file).
pub const EXIT_CONFIG_ERROR: i32 = 1;

/// Exit code for lifecycle errors (operation in the wrong engine state).
pub const EXIT_STATE_ERROR: i32 = 2;

/// Exit code for backend errors (connection failed, malformed response).
pub const EXIT_BACKEND_ERROR: i32 = 3;

/// Exit code for export/serialization errors.
pub const EXIT_EXPORT_ERROR: i32 = 4;

/// Exit code for validation errors (empty directive, empty case list).
pub const EXIT_VALIDATION_ERROR: i32 = 5;

/// Exit code for I/O errors (file read/write failures).
pub const EXIT_IO_ERROR: i32 = 10;

/// Exit code for a cancelled run.
pub const EXIT_CANCELLED: i32 = 20;

// =============================================================================
// BAIL_IF MACRO
// =============================================================================

/// Early return if condition is true.
///
/// Simplifies guard clauses in parameter validation:
///
/// ```ignore
/// use telos::error::{bail_if, Error, Result};
///
/// fn check(population: usize) -> Result<()> {
///     bail_if!(population == 0, Error::config("population_size", "must be positive"));
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail_if {
    ($cond:expr, $err:expr) => {
        if $cond {
            return Err($err);
        }
    };
}

// Re-export for convenience
pub use bail_if;

// =============================================================================
// ERROR TYPE
// =============================================================================

/// The main error type for Telos.
///
/// Each variant carries an error code prefix for easy identification in
/// logs and for programmatic handling via [`Error::code`].
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // CONFIGURATION ERRORS (E001-E009)
    // =========================================================================
    /// A configuration value is outside its valid range.
    #[error("[E001] Invalid configuration value for '{key}': {details}")]
    ConfigInvalidValue { key: String, details: String },

    /// Configuration file not found.
    #[error("[E002] Configuration file not found: {path}")]
    ConfigFileNotFound { path: String },

    /// Configuration file has invalid format.
    #[error("[E003] Invalid configuration format in {path}: {details}")]
    ConfigInvalidFormat { path: String, details: String },

    // =========================================================================
    // LIFECYCLE STATE ERRORS (E010-E019)
    // =========================================================================
    /// An operation was invoked in the wrong engine state.
    #[error("[E010] Cannot {operation} while engine is {state}")]
    InvalidState { operation: String, state: String },

    // =========================================================================
    // BACKEND ERRORS (E020-E029)
    // =========================================================================
    /// The generation backend could not be reached.
    #[error("[E020] Cannot connect to generation backend at {endpoint}")]
    BackendConnection {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with an unexpected payload or status.
    #[error("[E021] Unexpected backend response: {details}")]
    BackendResponse { details: String },

    /// A single generation call failed. Recovered by the evaluator; only
    /// surfaced when a caller invokes the backend directly.
    #[error("[E022] Generation request failed: {0}")]
    BackendInvocation(String),

    // =========================================================================
    // EXPORT/SERIALIZATION ERRORS (E030-E039)
    // =========================================================================
    /// JSON serialization or deserialization failed.
    #[error("[E030] Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An exported snapshot could not be re-ingested.
    #[error("[E031] Invalid evolution export: {0}")]
    Export(String),

    // =========================================================================
    // I/O ERRORS (E040-E049)
    // =========================================================================
    /// File read/write failure.
    #[error("[E040] I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // CANCELLATION (E050-E059)
    // =========================================================================
    /// The run was cancelled between backend calls.
    #[error("[E050] Evolution cancelled")]
    Cancelled,

    // =========================================================================
    // VALIDATION ERRORS (E060-E069)
    // =========================================================================
    /// Caller-supplied data failed validation.
    #[error("[E060] Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Shorthand constructor for configuration-value errors.
    pub fn config(key: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigInvalidValue {
            key: key.into(),
            details: details.into(),
        }
    }

    /// Shorthand constructor for wrong-state errors.
    pub fn state(operation: impl Into<String>, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    /// Get the error code for this error (e.g. "E001").
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigInvalidValue { .. } => "E001",
            Self::ConfigFileNotFound { .. } => "E002",
            Self::ConfigInvalidFormat { .. } => "E003",
            Self::InvalidState { .. } => "E010",
            Self::BackendConnection { .. } => "E020",
            Self::BackendResponse { .. } => "E021",
            Self::BackendInvocation(_) => "E022",
            Self::Serialization(_) => "E030",
            Self::Export(_) => "E031",
            Self::Io(_) => "E040",
            Self::Cancelled => "E050",
            Self::Validation(_) => "E060",
        }
    }

    /// Get the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigInvalidValue { .. }
            | Self::ConfigFileNotFound { .. }
            | Self::ConfigInvalidFormat { .. } => EXIT_CONFIG_ERROR,
            Self::InvalidState { .. } => EXIT_STATE_ERROR,
            Self::BackendConnection { .. }
            | Self::BackendResponse { .. }
            | Self::BackendInvocation(_) => EXIT_BACKEND_ERROR,
            Self::Serialization(_) | Self::Export(_) => EXIT_EXPORT_ERROR,
            Self::Io(_) => EXIT_IO_ERROR,
            Self::Cancelled => EXIT_CANCELLED,
            Self::Validation(_) => EXIT_VALIDATION_ERROR,
        }
    }

    /// Get an actionable suggestion for resolving this error, if one exists.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalidValue { .. } => {
                Some("Check the evolution parameters; population_size must be at least 2 and elite_size must not exceed it.")
            }
            Self::ConfigFileNotFound { .. } => {
                Some("Create a config file or rely on defaults by omitting --config.")
            }
            Self::BackendConnection { .. } => {
                Some("Verify the backend is running and the endpoint is correct (e.g. `ollama serve` on http://localhost:11434).")
            }
            Self::InvalidState { .. } => {
                Some("Call initialize_evolution and start_evolution before evolving.")
            }
            _ => None,
        }
    }
}

/// Result type alias using the Telos [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// TESTS
// =============================================================================
