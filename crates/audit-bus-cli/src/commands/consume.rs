//! Consume command: runs the audit worker.
//!
//! Exits 0 after a graceful shutdown (Ctrl-C or SIGTERM) and 1 when the
//! broker stays unreachable for every allowed attempt.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use audit_bus_broker::{AmqpTransport, ConnectionManager};
use audit_bus_store::{CreateAuditRecord, JsonlStore};
use audit_bus_worker::{
    AuditRecordHandler, EventConsumer, ReconnectPolicy, WorkerConfig, DEFAULT_CONSUMER_TAG,
};
use clap::Args;
use tracing::{info, warn};

use super::{BrokerArgs, StoreArgs};

/// Arguments for the consume command.
#[derive(Args, Debug)]
pub struct ConsumeArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Connection attempts before giving up, counting the first
    #[arg(long, default_value = "11")]
    pub max_connect_attempts: u32,

    /// Seconds between connection attempts
    #[arg(long, default_value = "3")]
    pub retry_delay_secs: u64,

    /// Double the delay after every failed attempt, up to --max-retry-delay-secs
    #[arg(long)]
    pub exponential_backoff: bool,

    /// Upper bound on the delay with --exponential-backoff
    #[arg(long, default_value = "60")]
    pub max_retry_delay_secs: u64,

    /// Consumer tag reported to the broker
    #[arg(long, default_value = DEFAULT_CONSUMER_TAG)]
    pub consumer_tag: String,
}

impl ConsumeArgs {
    fn reconnect_policy(&self) -> ReconnectPolicy {
        let delay = Duration::from_secs(self.retry_delay_secs);
        if self.exponential_backoff {
            ReconnectPolicy::exponential(
                delay,
                Duration::from_secs(self.max_retry_delay_secs),
                self.max_connect_attempts,
            )
        } else {
            ReconnectPolicy::fixed(delay, self.max_connect_attempts)
        }
    }
}

/// Execute the consume command.
pub async fn execute(args: ConsumeArgs) -> Result<()> {
    let config = args.broker.config();
    let store = JsonlStore::open(&args.store.store_path)
        .await
        .with_context(|| format!("Failed to open audit store {}", args.store.store_path.display()))?;

    info!(
        service = %config.service_name,
        broker = %config.redacted_url(),
        store = %args.store.store_path.display(),
        "Starting audit worker"
    );

    let manager = Arc::new(ConnectionManager::new(config, Arc::new(AmqpTransport::new())));
    let handler = AuditRecordHandler::new(CreateAuditRecord::new(Arc::new(store)));
    let worker_config = WorkerConfig::default()
        .with_reconnect(args.reconnect_policy())
        .with_consumer_tag(args.consumer_tag.clone());

    let consumer = EventConsumer::new(manager, Arc::new(handler), worker_config);
    consumer
        .run(shutdown_signal())
        .await
        .context("Audit worker stopped")?;

    Ok(())
}

/// Completes on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Interrupt received"),
        () = terminate => info!("Termination requested"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;

    fn parse(args: &[&str]) -> ConsumeArgs {
        let argv = std::iter::once("audit-bus").chain(std::iter::once("consume")).chain(args.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Consume(args) => args,
            _ => panic!("expected consume"),
        }
    }

    #[test]
    fn test_default_policy_is_ten_retries_three_seconds_apart() {
        let args = parse(&[]);
        assert_eq!(args.reconnect_policy(), ReconnectPolicy::default());
        assert_eq!(args.consumer_tag, "audit-bus-worker");
    }

    #[test]
    fn test_exponential_backoff_flags() {
        let args = parse(&[
            "--exponential-backoff",
            "--retry-delay-secs",
            "1",
            "--max-retry-delay-secs",
            "8",
            "--max-connect-attempts",
            "20",
        ]);
        let policy = args.reconnect_policy();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(10), Duration::from_secs(8));
    }
}
