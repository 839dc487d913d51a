//! CLI commands and argument parsing.

pub mod consume;
pub mod list;
pub mod publish;

use std::path::PathBuf;

use audit_bus_broker::BrokerConfig;
use clap::{Args, Parser, Subcommand};

/// Default audit record file when `AUDIT_STORE_PATH` is unset.
pub const DEFAULT_STORE_PATH: &str = "audit-records.jsonl";

/// audit-bus - Asynchronous audit event messaging
#[derive(Parser)]
#[command(name = "audit-bus")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the audit worker until interrupted
    Consume(consume::ConsumeArgs),

    /// Publish a single audit event
    Publish(publish::PublishArgs),

    /// List stored audit records
    List(list::ListArgs),

    /// Print version information
    Version,
}

/// Broker connection options shared by commands that talk to the broker.
#[derive(Args, Debug, Clone)]
pub struct BrokerArgs {
    /// Broker URL (falls back to RABBITMQ_URL, then amqp://localhost:5672)
    #[arg(long, env = "BROKER_URL")]
    pub broker_url: Option<String>,

    /// Service identity attached to events and log lines
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: Option<String>,
}

impl BrokerArgs {
    /// Resolves the broker configuration, flags first, then the environment.
    pub fn config(&self) -> BrokerConfig {
        let mut config = BrokerConfig::from_env();
        if let Some(url) = self.broker_url.as_deref().filter(|u| !u.trim().is_empty()) {
            config.url = url.to_string();
        }
        if let Some(service) = self.service_name.as_deref().filter(|s| !s.trim().is_empty()) {
            config.service_name = service.to_string();
        }
        config
    }
}

/// Audit record file option.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// JSON-lines file holding audit records
    #[arg(long, env = "AUDIT_STORE_PATH", default_value = DEFAULT_STORE_PATH)]
    pub store_path: PathBuf,
}
