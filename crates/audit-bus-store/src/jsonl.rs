//! Append-only JSON-lines audit record store.
//!
//! Each record is one line of JSON. The file is only ever appended to, which
//! matches the immutability of audit records; queries scan the whole file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use audit_bus_core::{new_record_id, Action, AuditRecord, NewAuditRecord, Status, Validate};
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::{select, AuditRecordStore};

/// Store backed by a JSON-lines file.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Opens (creating if needed) the store at `path`.
    ///
    /// Missing parent directories are created.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<AuditRecord>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| StoreError::Serialization {
                    path: self.path.clone(),
                    line: i + 1,
                    source,
                })
            })
            .collect()
    }

    async fn query(&self, keep: impl Fn(&AuditRecord) -> bool + Send, limit: Option<usize>) -> Result<Vec<AuditRecord>> {
        let records = self.load().await?;
        Ok(select(records.iter(), keep, limit))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl AuditRecordStore for JsonlStore {
    async fn save(&self, record: NewAuditRecord) -> Result<AuditRecord> {
        record.validate()?;
        let stored = record.into_record(new_record_id(), Utc::now());

        let mut line = serde_json::to_vec(&stored).map_err(|source| StoreError::Serialization {
            path: self.path.clone(),
            line: 0,
            source,
        })?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        file.write_all(&line).await.map_err(|e| io_error(&self.path, e))?;
        file.sync_data().await.map_err(|e| io_error(&self.path, e))?;

        debug!(id = %stored.id, path = %self.path.display(), "Appended audit record");
        Ok(stored)
    }

    async fn find_by_entity(&self, entity_type: &str, entity_id: i64) -> Result<Vec<AuditRecord>> {
        self.query(
            |r| r.entity_type == entity_type && r.entity_id == Some(entity_id),
            None,
        )
        .await
    }

    async fn find_all(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.query(|_| true, Some(limit)).await
    }

    async fn find_by_action(&self, action: Action, limit: usize) -> Result<Vec<AuditRecord>> {
        self.query(|r| r.action == action, Some(limit)).await
    }

    async fn find_by_status(&self, status: Status, limit: usize) -> Result<Vec<AuditRecord>> {
        self.query(|r| r.status == status, Some(limit)).await
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn new_record(entity_id: Option<i64>, action: Action, status: Status) -> NewAuditRecord {
        NewAuditRecord {
            entity_type: "factura".to_string(),
            entity_id,
            action,
            details: "Factura procesada".to_string(),
            status,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_open_creates_file_and_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");

        let store = JsonlStore::open(&path).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.path(), path);
        assert!(store.find_all(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();

        let saved = {
            let store = JsonlStore::open(&path).await.unwrap();
            let mut record = new_record(Some(5), Action::Create, Status::Success);
            record.timestamp = Some(at);
            store.save(record).await.unwrap()
        };

        let store = JsonlStore::open(&path).await.unwrap();
        let found = store.find_by_entity("factura", 5).await.unwrap();
        assert_eq!(found, vec![saved]);
        assert_eq!(found[0].timestamp, at);
    }

    #[tokio::test]
    async fn test_filters_and_limit() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path().join("audit.jsonl")).await.unwrap();

        store.save(new_record(Some(1), Action::Create, Status::Success)).await.unwrap();
        store.save(new_record(Some(2), Action::Delete, Status::Error)).await.unwrap();
        store.save(new_record(None, Action::List, Status::Success)).await.unwrap();

        let all = store.find_all(2).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action, Action::List);

        let deletes = store.find_by_action(Action::Delete, 10).await.unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].entity_id, Some(2));

        let ok = store.find_by_status(Status::Success, 10).await.unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_line_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = JsonlStore::open(&path).await.unwrap();
        store.save(new_record(Some(1), Action::Read, Status::Success)).await.unwrap();
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap()
            .write_all(b"{not json\n")
            .await
            .unwrap();

        let err = store.find_all(10).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_invalid_record_is_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let store = JsonlStore::open(&path).await.unwrap();
        let mut record = new_record(Some(1), Action::Read, Status::Success);
        record.entity_type = " ".to_string();

        assert!(store.save(record).await.is_err());
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "");
    }
}
