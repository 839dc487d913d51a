//! Queue topology.
//!
//! The audit bus uses a single durable queue whose retention is bounded by a
//! per-message TTL and a maximum length. Once the length limit is reached the
//! broker evicts according to its overflow policy (RabbitMQ default: drop the
//! oldest ready message).

use std::time::Duration;

/// Name of the audit events queue.
pub const AUDIT_QUEUE: &str = "audit_events";

/// Message time-to-live for the audit queue (24 hours).
pub const AUDIT_MESSAGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Maximum number of ready messages retained by the audit queue.
pub const AUDIT_MAX_LENGTH: u32 = 100_000;

/// Declaration parameters for a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    /// Queue name.
    pub name: String,

    /// Whether the queue survives a broker restart.
    pub durable: bool,

    /// Per-message time-to-live (`x-message-ttl`).
    pub message_ttl: Duration,

    /// Maximum ready messages (`x-max-length`).
    pub max_length: u32,
}

impl Default for QueueTopology {
    fn default() -> Self {
        Self::audit_events()
    }
}

impl QueueTopology {
    /// The audit events queue: durable, 24h TTL, 100k max length.
    pub fn audit_events() -> Self {
        Self {
            name: AUDIT_QUEUE.to_string(),
            durable: true,
            message_ttl: AUDIT_MESSAGE_TTL,
            max_length: AUDIT_MAX_LENGTH,
        }
    }

    /// Creates a durable queue topology with custom retention bounds.
    pub fn new(name: impl Into<String>, message_ttl: Duration, max_length: u32) -> Self {
        Self {
            name: name.into(),
            durable: true,
            message_ttl,
            max_length,
        }
    }

    /// `x-message-ttl` argument value in milliseconds, saturating at `i32::MAX`.
    pub fn ttl_millis(&self) -> i32 {
        i32::try_from(self.message_ttl.as_millis()).unwrap_or(i32::MAX)
    }

    /// `x-max-length` argument value, saturating at `i32::MAX`.
    pub fn max_length_arg(&self) -> i32 {
        i32::try_from(self.max_length).unwrap_or(i32::MAX)
    }
}

/// Handle to a declared queue, returned by
/// [`ConnectionManager::queue_handle`](crate::ConnectionManager::queue_handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    name: String,
}

impl QueueHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the queue name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
