//! Error types for the publisher crate.

use audit_bus_broker::BrokerError;
use audit_bus_core::ValidationErrors;
use thiserror::Error;

/// Result type alias for publish operations.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Errors that can occur while publishing an audit event.
///
/// None of these are fatal to the caller's business operation; they are
/// returned so the caller can decide to ignore them explicitly.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The event failed validation and was not sent.
    #[error("invalid audit event: {0}")]
    Validation(#[from] ValidationErrors),

    /// The envelope could not be serialized.
    #[error("failed to serialize audit event: {0}")]
    Serialization(#[from] audit_bus_core::Error),

    /// The broker could not be reached or refused the message.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Failure injected into a [`RecordingPublisher`](crate::RecordingPublisher).
    #[error("simulated publish failure: {0}")]
    Simulated(String),
}

impl PublishError {
    /// Returns true if publishing the same event later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Broker(e) => e.is_retryable(),
            Self::Simulated(_) => true,
            Self::Validation(_) | Self::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_bus_broker::ConnectionError;
    use audit_bus_core::ValidationError;

    #[test]
    fn test_broker_connection_error_is_transient() {
        let err = PublishError::from(BrokerError::from(ConnectionError::ConnectionRefused {
            endpoint: "amqp://localhost:5672".to_string(),
        }));
        assert!(err.is_transient());
        assert!(err.to_string().starts_with("broker error"));
    }

    #[test]
    fn test_validation_error_is_permanent() {
        let mut errors = ValidationErrors::new();
        errors.add(ValidationError::empty("details"));
        let err = PublishError::from(errors);
        assert!(!err.is_transient());
        assert!(err.to_string().contains("details"));
    }
}
