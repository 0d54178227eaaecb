//! Command-line interface for topic-relay
//!
//! # Usage Examples
//!
//! ```bash
//! # Forward orders to the exchange topic
//! topic-relay run \
//!   --brokers localhost:9092 \
//!   --bind orders=grp1 \
//!   --forward orders=orders-exchange
//!
//! # Load bindings and routes from a file, with verbose logging
//! topic-relay run --config-file relay.toml --log-level debug
//! ```
//!
//! Topics with a forward route get a passthrough handler that republishes
//! each message keyed by its `unique_id`; other topics are acknowledged.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use topic_relay::{default_registry, Config, KafkaClient, Manager};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "topic-relay")]
#[command(about = "Relay JSON messages between Kafka topics with at-least-once delivery")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the bound topics until interrupted
    Run {
        #[command(flatten)]
        config: Config,

        /// Log level used when RUST_LOG is not set
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, log_level } => {
            // Initialize tracing
            let filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&log_level))
                .with_context(|| format!("Invalid log level '{log_level}'"))?;
            tracing_subscriber::fmt().with_env_filter(filter).init();

            run_relay(config).await
        }
    }
}

async fn run_relay(config: Config) -> anyhow::Result<()> {
    let settings = config
        .resolve()
        .context("Failed to load relay configuration")?;
    let registry = default_registry(&settings)?;
    let client = KafkaClient::new(settings.consumer.clone(), settings.producer.clone());

    let manager = Manager::new(settings, Arc::new(client), registry)?;
    manager.start().await.context("Failed to start relay")?;
    tracing::info!(
        topics = manager.bindings().len(),
        "Relay running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    let report = manager.shutdown().await;
    for failure in &report.failures {
        tracing::error!(binding = %failure.binding, "Consumer failed: {}", failure.reason);
    }
    if !report.is_clean() {
        anyhow::bail!("{} consumer(s) failed", report.failures.len());
    }
    tracing::info!(stopped = report.stopped, "Relay stopped");
    Ok(())
}
