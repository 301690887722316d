//! JSON Output Envelope Types
//!
//! This module defines the structured JSON output format for CLI operations.
//! All operations print either a `SuccessEnvelope` or an `ErrorEnvelope`.
//!
//! # Output Contract
//! - Success: `{"ok": true, "database": "...", "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "database": "...", "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! Output is stable and suitable for programmatic parsing; logs never share
//! stdout with envelopes.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Success envelope for operation results
///
/// Generic over the data type to support different operation return values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Logical database name the operation ran against (empty for
    /// operations that are not database-specific, e.g. `list`)
    pub database: String,

    /// Command that was executed (list, query, update, ...)
    pub command: String,

    /// Operation-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    /// Create a new success envelope
    pub fn new(
        database: impl Into<String>,
        command: impl Into<String>,
        data: T,
        meta: Metadata,
    ) -> Self {
        Self { ok: true, database: database.into(), command: command.into(), data, meta }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Logical database name (empty if the failure is not database-specific)
    pub database: String,

    /// Command that was attempted
    pub command: String,

    /// Error information
    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    /// Create a new error envelope
    pub fn new(database: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, database: database.into(), command: command.into(), error }
    }

    /// Create error envelope from a `BridgeError`
    pub fn from_error(
        database: impl Into<String>,
        command: impl Into<String>,
        err: &BridgeError,
    ) -> Self {
        Self::new(
            database,
            command,
            ErrorInfo { code: err.error_code().to_string(), message: err.message() },
        )
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "NO_MATCH", "SUBSTITUTION_ERROR")
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error info
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of rows returned (for query results, None otherwise)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<usize>,
}

impl Metadata {
    /// Create new metadata with just execution time
    #[must_use]
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms, rows_returned: None }
    }

    /// Create new metadata with execution time and row count
    #[must_use]
    pub const fn with_rows(execution_ms: u64, rows_returned: usize) -> Self {
        Self { execution_ms, rows_returned: Some(rows_returned) }
    }
}
