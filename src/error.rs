//! Error types for pve-ontap-snapshot
//!
//! Every failure is surfaced to the operator with enough detail (pool id,
//! snapshot name, failing step) to inspect both Proxmox VE and ONTAP by hand.
//! Nothing here is retried or corrected automatically, apart from read-only
//! calls that fail at the transport level.

use std::process::ExitCode;
use thiserror::Error;

/// Unified error type for the orchestrator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Local Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("Interrupted by operator")]
    Interrupted,

    // =========================================================================
    // Correlation Errors
    // =========================================================================
    #[error("Cannot resolve storage pool {pool}: {reason}")]
    Resolution { pool: String, reason: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("{kind} already exists: {name}")]
    Conflict { kind: String, name: String },

    // =========================================================================
    // Remote Errors
    // =========================================================================
    #[error("{system} call failed: {operation}: {reason}")]
    RemoteCall {
        system: String,
        operation: String,
        reason: String,
        transient: bool,
    },

    #[error(
        "Partial failure in {operation} at step '{step}': {orphan} was left behind ({reason}); \
         manual cleanup required"
    )]
    PartialFailure {
        operation: String,
        step: String,
        orphan: String,
        reason: String,
    },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {0}")]
    Output(String),
}

impl Error {
    /// Build a remote call error that is not worth retrying
    pub fn remote(
        system: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::RemoteCall {
            system: system.into(),
            operation: operation.into(),
            reason: reason.into(),
            transient: false,
        }
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::Conflict {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn resolution(pool: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Resolution {
            pool: pool.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error category
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Configuration(_) => 2,
            Error::Resolution { .. } => 3,
            Error::NotFound { .. } => 4,
            Error::Conflict { .. } => 5,
            Error::RemoteCall { .. } | Error::Http(_) => 6,
            Error::PartialFailure { .. } => 7,
            Error::ConfirmationRequired(_) => 8,
            Error::Interrupted => 130,
            Error::JsonParse(_) | Error::Io(_) | Error::Output(_) => 1,
        }
    }

    /// Check if this error is transient.
    ///
    /// Only transport-level failures qualify; an HTTP error status from either
    /// API is an answer, not a transient condition.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RemoteCall { transient, .. } => *transient,
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        ExitCode::from(err.exit_code())
    }
}

/// Result type alias for the orchestrator
pub type Result<T> = std::result::Result<T, Error>;
