//! Error types for the store crate.

use std::path::PathBuf;

use audit_bus_core::ValidationErrors;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while persisting or querying audit records.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The record failed validation and was not stored.
    #[error("invalid audit record: {0}")]
    Validation(#[from] ValidationErrors),

    /// The backing file could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be encoded or decoded.
    #[error("corrupt record at {path}:{line}: {source}")]
    Serialization {
        /// File path.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}
