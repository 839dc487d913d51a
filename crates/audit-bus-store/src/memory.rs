//! In-memory audit record store.

use async_trait::async_trait;
use audit_bus_core::{new_record_id, Action, AuditRecord, NewAuditRecord, Status, Validate};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::{select, AuditRecordStore};

/// Store that keeps records in process memory.
///
/// Supports failure injection so callers can exercise their handling of a
/// store outage.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<AuditRecord>>,
    failing_saves: Mutex<u32>,
    unavailable: Mutex<Option<String>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` saves fail with a backend error.
    pub fn fail_next_saves(&self, count: u32) {
        *self.failing_saves.lock() = count;
    }

    /// Makes every operation fail with `reason` until cleared with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.lock() = reason.map(str::to_string);
    }

    /// Returns a snapshot of every stored record in insertion order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check_available(&self) -> Result<()> {
        match self.unavailable.lock().as_deref() {
            Some(reason) => Err(StoreError::Backend(reason.to_string())),
            None => Ok(()),
        }
    }

    fn take_injected_failure(&self) -> bool {
        let mut failing = self.failing_saves.lock();
        if *failing > 0 {
            *failing -= 1;
            true
        } else {
            false
        }
    }

    fn query(&self, keep: impl Fn(&AuditRecord) -> bool, limit: Option<usize>) -> Result<Vec<AuditRecord>> {
        self.check_available()?;
        Ok(select(self.records.read().iter(), keep, limit))
    }
}

#[async_trait]
impl AuditRecordStore for InMemoryStore {
    async fn save(&self, record: NewAuditRecord) -> Result<AuditRecord> {
        self.check_available()?;
        if self.take_injected_failure() {
            return Err(StoreError::Backend("injected save failure".to_string()));
        }
        record.validate()?;

        let stored = record.into_record(new_record_id(), Utc::now());
        self.records.write().push(stored.clone());
        debug!(id = %stored.id, entity_type = %stored.entity_type, "Stored audit record");
        Ok(stored)
    }

    async fn find_by_entity(&self, entity_type: &str, entity_id: i64) -> Result<Vec<AuditRecord>> {
        self.query(
            |r| r.entity_type == entity_type && r.entity_id == Some(entity_id),
            None,
        )
    }

    async fn find_all(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.query(|_| true, Some(limit))
    }

    async fn find_by_action(&self, action: Action, limit: usize) -> Result<Vec<AuditRecord>> {
        self.query(|r| r.action == action, Some(limit))
    }

    async fn find_by_status(&self, status: Status, limit: usize) -> Result<Vec<AuditRecord>> {
        self.query(|r| r.status == status, Some(limit))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(entity_type: &str, entity_id: Option<i64>, action: Action, status: Status) -> NewAuditRecord {
        NewAuditRecord {
            entity_type: entity_type.to_string(),
            entity_id,
            action,
            details: format!("{action} {entity_type}"),
            status,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_save_assigns_identity() {
        let store = InMemoryStore::new();
        let saved = store
            .save(new_record("cliente", Some(1), Action::Create, Status::Success))
            .await
            .unwrap();

        assert_eq!(saved.timestamp, saved.created_at);
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].id, saved.id);
    }

    #[tokio::test]
    async fn test_queries_are_newest_first() {
        let store = InMemoryStore::new();
        for id in 1..=3 {
            store
                .save(new_record("cliente", Some(id), Action::Update, Status::Success))
                .await
                .unwrap();
        }
        store
            .save(new_record("factura", Some(9), Action::Delete, Status::Error))
            .await
            .unwrap();

        let all = store.find_all(10).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].entity_type, "factura");
        assert_eq!(all[3].entity_id, Some(1));

        let limited = store.find_all(2).await.unwrap();
        assert_eq!(limited.len(), 2);

        let updates = store.find_by_action(Action::Update, 100).await.unwrap();
        assert_eq!(updates.iter().map(|r| r.entity_id).collect::<Vec<_>>(), vec![Some(3), Some(2), Some(1)]);

        let errors = store.find_by_status(Status::Error, 100).await.unwrap();
        assert_eq!(errors.len(), 1);

        let entity = store.find_by_entity("cliente", 2).await.unwrap();
        assert_eq!(entity.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_record_is_rejected() {
        let store = InMemoryStore::new();
        let mut record = new_record("cliente", None, Action::List, Status::Success);
        record.details = String::new();

        let err = store.save(record).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryStore::new();
        store.fail_next_saves(1);

        let err = store
            .save(new_record("cliente", Some(1), Action::Create, Status::Success))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)), "{err:?}");
        store
            .save(new_record("cliente", Some(1), Action::Create, Status::Success))
            .await
            .unwrap();

        store.set_unavailable(Some("database down"));
        assert!(store.find_all(10).await.is_err());
        store.set_unavailable(None);
        assert_eq!(store.find_all(10).await.unwrap().len(), 1);
    }
}
