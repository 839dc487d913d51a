//! audit-bus CLI - runs the audit worker and inspects stored audit records.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audit_bus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Consume(args) => commands::consume::execute(args).await,
        Commands::Publish(args) => commands::publish::execute(args).await,
        Commands::List(args) => commands::list::execute(args).await,
        Commands::Version => {
            println!("audit-bus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "audit-bus failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
