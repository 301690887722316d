//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Sqlbridge.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `Configuration`: malformed or incomplete configuration document
//! - `DriverNotFound`: requested driver name not present in the namespace
//! - `NoMatch`: no configured database matches the requested logical name
//! - `Substitution`: placeholder index has no corresponding capture group
//! - `ConnectionFailed`: database connection errors
//! - `QueryFailed`: query execution errors
//! - `Unsupported`: operation not implemented by the selected driver
//! - `InvalidInput`: malformed input or missing required parameters

use thiserror::Error;

/// Main error type for Sqlbridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Malformed or incomplete configuration document
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Requested driver name not registered
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// No configured database matches the requested logical name
    #[error("No database matches '{0}'")]
    NoMatch(String),

    /// Placeholder index has no corresponding capture group
    #[error("Substitution failed: placeholder index {index} out of range, pattern captured {available} group(s)")]
    Substitution { index: usize, available: usize },

    /// Database connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Operation not implemented by the selected driver
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BridgeError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling by callers.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::DriverNotFound(_) => "DRIVER_NOT_FOUND",
            Self::NoMatch(_) => "NO_MATCH",
            Self::Substitution { .. } => "SUBSTITUTION_ERROR",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    /// Get human-readable error message (no credentials, no file contents)
    #[must_use]
    pub fn message(&self) -> String {
        // Use Display implementation from thiserror
        self.to_string()
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a driver-not-found error
    pub fn driver_not_found(name: impl Into<String>) -> Self {
        Self::DriverNotFound(name.into())
    }

    /// Create a no-match error for a logical database name
    pub fn no_match(database_name: impl Into<String>) -> Self {
        Self::NoMatch(database_name.into())
    }

    /// Create a substitution error for an out-of-range placeholder
    #[must_use]
    pub const fn substitution(index: usize, available: usize) -> Self {
        Self::Substitution { index, available }
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create an unsupported-operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Result type alias for Sqlbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
