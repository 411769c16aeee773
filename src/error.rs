//! Application error types for roster-sync
//!
//! Only [`SetupError`] ever escapes a sync run. Row and storage failures are
//! recorded in the run summary and the run carries on.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::models::Environment;

/// Fatal errors raised before any destination mutation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SetupError {
    /// Credentials for an environment are absent or unexpanded
    #[error("{environment} credentials not configured: missing {field}")]
    MissingCredentials {
        /// Environment whose configuration is incomplete
        environment: Environment,
        /// Name of the missing setting
        field: String,
    },

    /// A configuration value cannot be used
    #[error("Invalid {environment} configuration: {message}")]
    InvalidConfig {
        /// Environment the value belongs to
        environment: Environment,
        /// What is wrong with it
        message: String,
    },

    /// A handle was requested while another one was still alive
    #[error("Cannot open {requested} handle while {active} handle is still open")]
    HandleInUse {
        /// Environment of the handle still alive
        active: Environment,
        /// Environment requested
        requested: Environment,
    },

    /// Source and destination are the same environment
    #[error("Source and destination are both {0}")]
    SameEnvironment(Environment),

    /// A backend client could not be constructed
    #[error("Failed to connect to {environment}: {message}")]
    Backend {
        /// Environment being connected to
        environment: Environment,
        /// Underlying cause
        message: String,
    },
}

/// Row store errors
#[derive(Debug, Error)]
pub enum DbError {
    /// Transport failure talking to a remote row store
    #[error("Request failed: {0}")]
    Request(String),

    /// Remote row store answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// SQLite connection task error
    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    /// Row could not be decoded
    #[error("Invalid row data: {0}")]
    Decode(String),
}

/// Object storage errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    /// Network timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Rate limited by storage
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Server error
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Request rejected by storage
    #[error("Request rejected: HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Object already exists at the target path
    #[error("Object already exists: {0}")]
    Duplicate(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Unauthorized
    #[error("Unauthorized")]
    Unauthorized,

    /// Invalid data received
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(err.to_string()),
            std::io::ErrorKind::AlreadyExists => StorageError::Duplicate(err.to_string()),
            _ => StorageError::Io(err.to_string()),
        }
    }
}

/// Application-level error type
///
/// Used by the binary to report anything that stops it before or instead of
/// a sync run.
#[derive(Debug, Error)]
pub enum AppError {
    /// Fatal setup failure
    #[error("Setup failed: {0}")]
    Setup(#[from] SetupError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialised
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;

    /// Minimum wait requested by the remote side before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for StorageError {
    fn is_retryable(&self) -> bool {
        match self {
            // Retryable errors
            StorageError::NetworkTimeout => true,
            StorageError::ConnectionRefused => true,
            StorageError::RateLimited(_) => true,
            StorageError::ServerError(_) => true,
            StorageError::Network(_) => true,
            StorageError::Io(_) => true,

            // Non-retryable errors
            StorageError::Rejected { .. } => false,
            StorageError::Duplicate(_) => false,
            StorageError::NotFound(_) => false,
            StorageError::Unauthorized => false,
            StorageError::InvalidData(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            StorageError::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}
