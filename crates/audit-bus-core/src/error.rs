//! Error types for audit bus core operations.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or decoding audit messages.
#[derive(Error, Debug)]
pub enum Error {
    /// The body is not JSON at all.
    #[error("Malformed audit message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The body is JSON but does not have the audit message shape (missing
    /// field, wrong type, unknown action or status, bad timestamp).
    #[error("Unexpected audit message shape: {0}")]
    Shape(#[source] serde_json::Error),

    /// The message decoded but violates a field constraint.
    #[error("Invalid audit message: {0}")]
    Invalid(#[from] ValidationErrors),

    /// A textual enum value could not be parsed.
    #[error("Unknown {kind} '{value}'")]
    UnknownVariant {
        /// Which enum was being parsed (`action` or `status`).
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}
