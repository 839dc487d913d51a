//! Application operations over an [`AuditRecordStore`].

use std::sync::Arc;

use audit_bus_core::{Action, AuditRecord, NewAuditRecord, Status, Validate};
use tracing::info;

use crate::error::Result;
use crate::store::AuditRecordStore;

/// Default number of records returned by [`ListAuditRecords`].
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Persists one audit record.
#[derive(Debug, Clone)]
pub struct CreateAuditRecord {
    store: Arc<dyn AuditRecordStore>,
}

impl CreateAuditRecord {
    /// Creates the use case over `store`.
    pub fn new(store: Arc<dyn AuditRecordStore>) -> Self {
        Self { store }
    }

    /// Validates and stores `record`.
    pub async fn execute(&self, record: NewAuditRecord) -> Result<AuditRecord> {
        record.validate()?;
        let stored = self.store.save(record).await?;
        info!(
            store = self.store.name(),
            id = %stored.id,
            entity_type = %stored.entity_type,
            entity_id = ?stored.entity_id,
            action = %stored.action,
            status = %stored.status,
            "Audit record created"
        );
        Ok(stored)
    }
}

/// Filter for [`ListAuditRecords`].
///
/// `action` takes precedence over `status`; with neither, every record is
/// listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListFilter {
    /// Only records with this action.
    pub action: Option<Action>,

    /// Only records with this status.
    pub status: Option<Status>,

    /// Maximum number of records.
    pub limit: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            action: None,
            status: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl ListFilter {
    /// Filters by action.
    #[must_use]
    pub const fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Filters by status.
    #[must_use]
    pub const fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Lists audit records, newest first.
#[derive(Debug, Clone)]
pub struct ListAuditRecords {
    store: Arc<dyn AuditRecordStore>,
}

impl ListAuditRecords {
    /// Creates the use case over `store`.
    pub fn new(store: Arc<dyn AuditRecordStore>) -> Self {
        Self { store }
    }

    /// Returns the records matching `filter`.
    pub async fn execute(&self, filter: ListFilter) -> Result<Vec<AuditRecord>> {
        match (filter.action, filter.status) {
            (Some(action), _) => self.store.find_by_action(action, filter.limit).await,
            (None, Some(status)) => self.store.find_by_status(status, filter.limit).await,
            (None, None) => self.store.find_all(filter.limit).await,
        }
    }

    /// Returns every record about one entity.
    pub async fn for_entity(&self, entity_type: &str, entity_id: i64) -> Result<Vec<AuditRecord>> {
        self.store.find_by_entity(entity_type, entity_id).await
    }
}
