//! Error types for the broker crate.

use thiserror::Error;

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur while talking to the message broker.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Connection error.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// No open connection is available for an operation that cannot reconnect.
    #[error("not connected to broker")]
    NotConnected,

    /// Channel-level failure (open, qos, close).
    #[error("channel error: {reason}")]
    Channel {
        /// Failure reason.
        reason: String,
    },

    /// Queue declaration was rejected.
    #[error("failed to declare queue '{queue}': {reason}")]
    QueueDeclare {
        /// Queue name.
        queue: String,
        /// Failure reason.
        reason: String,
    },

    /// The broker did not accept a published message.
    #[error("failed to publish to queue '{queue}': {reason}")]
    Publish {
        /// Queue name.
        queue: String,
        /// Failure reason.
        reason: String,
    },

    /// Subscription could not be started.
    #[error("failed to subscribe to queue '{queue}': {reason}")]
    Subscribe {
        /// Queue name.
        queue: String,
        /// Failure reason.
        reason: String,
    },

    /// Ack or nack of a delivery failed.
    #[error("failed to settle delivery {delivery_tag}: {reason}")]
    Settle {
        /// Delivery tag being settled.
        delivery_tag: u64,
        /// Failure reason.
        reason: String,
    },

    /// A delivery could not be received from an active subscription.
    #[error("delivery error: {reason}")]
    Delivery {
        /// Failure reason.
        reason: String,
    },
}

/// Connection-related errors.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to establish connection.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed {
        /// Target endpoint (credentials redacted).
        endpoint: String,
        /// Failure reason.
        reason: String,
    },

    /// Connection was refused.
    #[error("connection refused by {endpoint}")]
    ConnectionRefused {
        /// Target endpoint (credentials redacted).
        endpoint: String,
    },
}

impl BrokerError {
    /// Returns true if reconnecting and retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::NotConnected | Self::Channel { .. } | Self::Delivery { .. }
        )
    }
}
