//! Publish command: sends one audit event, as a business service would.

use std::sync::Arc;

use anyhow::{Context, Result};
use audit_bus_broker::{AmqpTransport, ConnectionManager};
use audit_bus_core::{Action, AuditEvent, Status};
use audit_bus_publisher::{AuditPublisher, EventPublisher};
use chrono::{DateTime, Utc};
use clap::Args;

use super::BrokerArgs;

/// Arguments for the publish command.
#[derive(Args, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Kind of subject, e.g. "cliente"
    #[arg(long)]
    pub entity_type: String,

    /// Subject identifier (omit for list operations)
    #[arg(long)]
    pub entity_id: Option<i64>,

    /// Operation: CREATE, READ, UPDATE, DELETE, LIST
    #[arg(long)]
    pub action: Action,

    /// Human-readable description
    #[arg(long)]
    pub details: String,

    /// Outcome: SUCCESS, ERROR
    #[arg(long, default_value = "SUCCESS")]
    pub status: Status,

    /// Business-event time (RFC 3339); defaults to now
    #[arg(long)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PublishArgs {
    fn event(&self) -> AuditEvent {
        let event = AuditEvent::new(
            self.entity_type.clone(),
            self.entity_id,
            self.action,
            self.details.clone(),
            self.status,
        );
        match self.timestamp {
            Some(ts) => event.with_timestamp(ts),
            None => event,
        }
    }
}

/// Execute the publish command.
pub async fn execute(args: PublishArgs) -> Result<()> {
    let manager = Arc::new(ConnectionManager::new(
        args.broker.config(),
        Arc::new(AmqpTransport::new()),
    ));
    let publisher = EventPublisher::new(Arc::clone(&manager));

    let result = publisher.publish(&args.event()).await;
    manager.disconnect().await;

    let receipt = result.context("Failed to publish audit event")?;
    println!("Published to {} ({} bytes)", receipt.queue, receipt.bytes);
    println!("{}", serde_json::to_string_pretty(&receipt.message)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;

    fn parse(args: &[&str]) -> PublishArgs {
        let argv = ["audit-bus", "publish"].into_iter().chain(args.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Publish(args) => args,
            _ => panic!("expected publish"),
        }
    }

    #[test]
    fn test_parse_event() {
        let args = parse(&[
            "--entity-type",
            "factura",
            "--entity-id",
            "12",
            "--action",
            "delete",
            "--details",
            "Factura eliminada",
            "--status",
            "error",
            "--timestamp",
            "2025-01-01T10:00:00Z",
        ]);
        let event = args.event();
        assert_eq!(event.entity_id, Some(12));
        assert_eq!(event.action, Action::Delete);
        assert_eq!(event.status, Status::Error);
        assert_eq!(
            event.timestamp.map(|t| t.to_rfc3339()),
            Some("2025-01-01T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--entity-type", "cliente", "--action", "LIST", "--details", "Listado"]);
        let event = args.event();
        assert_eq!(event.entity_id, None);
        assert_eq!(event.status, Status::Success);
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let argv = [
            "audit-bus", "publish", "--entity-type", "cliente", "--action", "ARCHIVE", "--details", "x",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
