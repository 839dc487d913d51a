//! Audit event publisher.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use audit_bus_broker::{ConnectionManager, MessageProperties, QueueTopology};
use audit_bus_core::{AuditEvent, AuditMessage, Validate};
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::error::{PublishError, Result};

/// Confirmation that an event was handed to the broker.
///
/// Publisher confirms are not enabled, so this only means the broker accepted
/// the frame on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Queue the event was routed to.
    pub queue: String,

    /// The envelope as sent.
    pub message: AuditMessage,

    /// Size of the JSON body in bytes.
    pub bytes: usize,
}

/// Result of publishing a sequence of events.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Number of events published before the batch stopped.
    pub published: usize,

    /// The failure that stopped the batch, if any.
    pub error: Option<PublishError>,
}

impl BatchOutcome {
    /// Returns true if every event was published.
    pub const fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Something audit events can be published to.
///
/// Business code depends on this trait so tests can substitute a
/// [`RecordingPublisher`](crate::RecordingPublisher).
#[async_trait]
pub trait AuditPublisher: Send + Sync + Debug {
    /// Publishes one event.
    ///
    /// Failures are returned, never raised; callers that must not fail their
    /// business operation simply ignore the error.
    async fn publish(&self, event: &AuditEvent) -> Result<PublishReceipt>;

    /// Publishes `events` in order, stopping at the first failure.
    async fn publish_batch(&self, events: &[AuditEvent]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for event in events {
            match self.publish(event).await {
                Ok(_) => outcome.published += 1,
                Err(e) => {
                    outcome.error = Some(e);
                    break;
                }
            }
        }
        outcome
    }
}

/// Publishes audit events to the durable audit queue.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    manager: Arc<ConnectionManager>,
    topology: QueueTopology,
    service: String,
}

impl EventPublisher {
    /// Creates a publisher using the service name and topology configured on
    /// `manager`.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        let config = manager.config();
        let topology = config.topology.clone();
        let service = config.service_name.clone();
        Self {
            manager,
            topology,
            service,
        }
    }

    /// Overrides the service name attached to published events.
    #[must_use]
    pub fn with_service_name(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Returns the service name attached to published events.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the shared connection manager.
    pub const fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    #[instrument(
        skip(self, event),
        fields(service = %self.service, entity_type = %event.entity_type, action = %event.action)
    )]
    async fn send(&self, event: &AuditEvent) -> Result<PublishReceipt> {
        event.validate()?;

        let message = AuditMessage::from_event(event, &self.service);
        let body = message.to_json()?;

        self.manager.ensure_connected().await?;
        let queue = self.manager.queue_handle(&self.topology).await?;

        let sent_at = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        self.manager
            .publish(&queue, &body, &MessageProperties::persistent_json(sent_at))
            .await?;

        debug!(queue = %queue.name(), bytes = body.len(), "Published audit event");
        Ok(PublishReceipt {
            queue: queue.name().to_string(),
            message,
            bytes: body.len(),
        })
    }
}

#[async_trait]
impl AuditPublisher for EventPublisher {
    async fn publish(&self, event: &AuditEvent) -> Result<PublishReceipt> {
        self.send(event).await.inspect_err(|e| {
            warn!(
                service = %self.service,
                entity_type = %event.entity_type,
                action = %event.action,
                transient = e.is_transient(),
                error = %e,
                "Failed to publish audit event"
            );
        })
    }
}
