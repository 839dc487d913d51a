//! In-memory publisher for tests of code that emits audit events.

use async_trait::async_trait;
use audit_bus_broker::AUDIT_QUEUE;
use audit_bus_core::{Action, AuditEvent, AuditMessage, Status, Validate};
use parking_lot::Mutex;

use crate::error::{PublishError, Result};
use crate::publisher::{AuditPublisher, PublishReceipt};

/// Publisher that records envelopes instead of sending them.
#[derive(Debug)]
pub struct RecordingPublisher {
    service: String,
    messages: Mutex<Vec<AuditMessage>>,
    failure: Mutex<Option<String>>,
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new("test-service")
    }
}

impl RecordingPublisher {
    /// Creates a recording publisher stamping events with `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            messages: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Makes every following publish fail with `reason` until [`Self::succeed`].
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    /// Clears a failure set with [`Self::fail_with`].
    pub fn succeed(&self) {
        *self.failure.lock() = None;
    }

    /// Returns every recorded envelope, oldest first.
    pub fn events(&self) -> Vec<AuditMessage> {
        self.messages.lock().clone()
    }

    /// Returns the most recent envelope.
    pub fn last_event(&self) -> Option<AuditMessage> {
        self.messages.lock().last().cloned()
    }

    /// Returns the number of recorded envelopes.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Returns the first envelope matching `action`, `entity_type` and `status`.
    pub fn find(&self, action: Action, entity_type: &str, status: Status) -> Option<AuditMessage> {
        self.messages
            .lock()
            .iter()
            .find(|m| m.action == action && m.entity_type == entity_type && m.status == status)
            .cloned()
    }

    /// Discards all recorded envelopes.
    pub fn reset(&self) {
        self.messages.lock().clear();
    }
}

#[async_trait]
impl AuditPublisher for RecordingPublisher {
    async fn publish(&self, event: &AuditEvent) -> Result<PublishReceipt> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(PublishError::Simulated(reason));
        }
        event.validate()?;

        let message = AuditMessage::from_event(event, &self.service);
        let bytes = message.to_json()?.len();
        self.messages.lock().push(message.clone());

        Ok(PublishReceipt {
            queue: AUDIT_QUEUE.to_string(),
            message,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_published_events() {
        let publisher = RecordingPublisher::new("clientes-service");
        publisher
            .publish(&AuditEvent::success("cliente", Some(1), Action::Create, "Creado"))
            .await
            .unwrap();
        publisher
            .publish(&AuditEvent::failure("cliente", None, Action::List, "Fallo"))
            .await
            .unwrap();

        assert_eq!(publisher.len(), 2);
        let last = publisher.last_event().unwrap();
        assert_eq!(last.action, Action::List);
        assert_eq!(last.service, "clientes-service");

        let found = publisher.find(Action::Create, "cliente", Status::Success).unwrap();
        assert_eq!(found.entity_id, Some(1));
        assert!(publisher.find(Action::Delete, "cliente", Status::Success).is_none());
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let publisher = RecordingPublisher::default();
        publisher.fail_with("broker down");

        let err = publisher
            .publish(&AuditEvent::success("factura", Some(7), Action::Read, "Leida"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Simulated(_)));
        assert!(publisher.is_empty());

        publisher.succeed();
        let outcome = publisher
            .publish_batch(&[AuditEvent::success("factura", Some(7), Action::Read, "Leida")])
            .await;
        assert!(outcome.is_complete());
        assert_eq!(publisher.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_and_validation() {
        let publisher = RecordingPublisher::default();
        publisher
            .publish(&AuditEvent::success("factura", Some(7), Action::Read, "Leida"))
            .await
            .unwrap();
        publisher.reset();
        assert!(publisher.is_empty());

        let err = publisher
            .publish(&AuditEvent::success(" ", Some(7), Action::Read, "Leida"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Validation(_)));
    }
}
