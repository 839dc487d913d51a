//! List command: prints stored audit records, newest first.

use std::fmt::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use audit_bus_core::{format_timestamp, Action, AuditRecord, Status};
use audit_bus_store::{JsonlStore, ListAuditRecords, ListFilter, DEFAULT_LIST_LIMIT};
use clap::Args;

use super::StoreArgs;

/// Arguments for the list command.
#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Only records with this action
    #[arg(long)]
    pub action: Option<Action>,

    /// Only records with this status (ignored with --action)
    #[arg(long)]
    pub status: Option<Status>,

    /// Only records about this entity type (requires --entity-id)
    #[arg(long, requires = "entity_id")]
    pub entity_type: Option<String>,

    /// Only records about this entity id (requires --entity-type)
    #[arg(long, requires = "entity_type")]
    pub entity_id: Option<i64>,

    /// Maximum number of records
    #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
    pub limit: usize,

    /// Output format: text, json
    #[arg(long, default_value = "text")]
    pub output: String,
}

impl ListArgs {
    fn filter(&self) -> ListFilter {
        ListFilter {
            action: self.action,
            status: self.status,
            limit: self.limit,
        }
    }
}

/// Execute the list command.
pub async fn execute(args: ListArgs) -> Result<()> {
    let records = load(&args).await?;

    if args.output == "json" {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print!("{}", render_text(&records));
    }
    Ok(())
}

async fn load(args: &ListArgs) -> Result<Vec<AuditRecord>> {
    let store = JsonlStore::open(&args.store.store_path)
        .await
        .with_context(|| format!("Failed to open audit store {}", args.store.store_path.display()))?;
    let list = ListAuditRecords::new(Arc::new(store));

    let records = match (&args.entity_type, args.entity_id) {
        (Some(entity_type), Some(entity_id)) => list.for_entity(entity_type, entity_id).await,
        _ => list.execute(args.filter()).await,
    };
    records.context("Failed to read audit records")
}

fn render_text(records: &[AuditRecord]) -> String {
    if records.is_empty() {
        return "No audit records\n".to_string();
    }

    let mut out = String::new();
    for r in records {
        let entity_id = r
            .entity_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let _ = writeln!(
            out,
            "{}  {:<7} {:<6} {}:{}  {}",
            format_timestamp(&r.timestamp),
            r.status.as_str(),
            r.action.as_str(),
            r.entity_type,
            entity_id,
            r.details
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_bus_core::NewAuditRecord;
    use audit_bus_store::AuditRecordStore;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use tempfile::TempDir;

    fn args(path: &Path) -> ListArgs {
        ListArgs {
            store: StoreArgs {
                store_path: path.to_path_buf(),
            },
            action: None,
            status: None,
            entity_type: None,
            entity_id: None,
            limit: DEFAULT_LIST_LIMIT,
            output: "text".to_string(),
        }
    }

    async fn seed(path: &Path) {
        let store = JsonlStore::open(path).await.unwrap();
        for (id, action, status) in [
            (Some(1), Action::Create, Status::Success),
            (Some(1), Action::Update, Status::Error),
            (None, Action::List, Status::Success),
        ] {
            store
                .save(NewAuditRecord {
                    entity_type: "cliente".to_string(),
                    entity_id: id,
                    action,
                    details: format!("{action} cliente"),
                    status,
                    timestamp: Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_filters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        seed(&path).await;

        let mut list_args = args(&path);
        assert_eq!(load(&list_args).await.unwrap().len(), 3);

        list_args.status = Some(Status::Error);
        let errors = load(&list_args).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].action, Action::Update);

        list_args.status = None;
        list_args.entity_type = Some("cliente".to_string());
        list_args.entity_id = Some(1);
        assert_eq!(load(&list_args).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_render_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        assert_eq!(render_text(&load(&args(&path)).await.unwrap()), "No audit records\n");

        seed(&path).await;
        let text = render_text(&load(&args(&path)).await.unwrap());
        let first = text.lines().next().unwrap();
        assert!(first.starts_with("2025-01-01T10:00:00Z"));
        assert!(first.contains("cliente:-"));
        assert_eq!(text.lines().count(), 3);
    }
}
