//! The audit record store abstraction.

use std::fmt::Debug;

use async_trait::async_trait;
use audit_bus_core::{Action, AuditRecord, NewAuditRecord, Status};

use crate::error::Result;

/// Persistent storage for audit records.
///
/// Records are append-only; there is no update or delete. Every query returns
/// records newest first by `created_at`.
#[async_trait]
pub trait AuditRecordStore: Send + Sync + Debug {
    /// Stores a record, assigning its `id` and `created_at`.
    async fn save(&self, record: NewAuditRecord) -> Result<AuditRecord>;

    /// Returns every record about one entity.
    async fn find_by_entity(&self, entity_type: &str, entity_id: i64) -> Result<Vec<AuditRecord>>;

    /// Returns up to `limit` records.
    async fn find_all(&self, limit: usize) -> Result<Vec<AuditRecord>>;

    /// Returns up to `limit` records with the given action.
    async fn find_by_action(&self, action: Action, limit: usize) -> Result<Vec<AuditRecord>>;

    /// Returns up to `limit` records with the given status.
    async fn find_by_status(&self, status: Status, limit: usize) -> Result<Vec<AuditRecord>>;

    /// Returns the backend name for identification.
    fn name(&self) -> &'static str;
}

/// Applies `keep` to records in insertion order, then orders them newest
/// first (later insertions first on equal `created_at`) and truncates to
/// `limit`.
pub(crate) fn select<'a>(
    records: impl DoubleEndedIterator<Item = &'a AuditRecord>,
    keep: impl Fn(&AuditRecord) -> bool,
    limit: Option<usize>,
) -> Vec<AuditRecord> {
    let mut selected: Vec<AuditRecord> = records.rev().filter(|&r| keep(r)).cloned().collect();
    selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    if let Some(limit) = limit {
        selected.truncate(limit);
    }
    selected
}
