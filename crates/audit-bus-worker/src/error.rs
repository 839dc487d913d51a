//! Error types for the worker crate.

use audit_bus_broker::BrokerError;
use thiserror::Error;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Errors that stop the consumer.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Every allowed connection attempt failed.
    #[error("gave up connecting to broker after {attempts} attempts: {last_error}")]
    ConnectRetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last_error: BrokerError,
    },

    /// The broker rejected the subscription in a way retrying cannot fix.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}
