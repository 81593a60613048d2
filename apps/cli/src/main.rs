//! `moorage` — pooled broker publisher demo
//!
//! `moorage run` opens a pool of publisher connections, starts a heartbeat
//! on top of it and runs until Ctrl-C or SIGTERM, then shuts down in two
//! passes: the heartbeat and in-flight publishes finish first, connections
//! are closed last. `moorage check-config` prints the resolved configuration.

mod config;
mod heartbeat;
mod publisher;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::Serialized;
use moorage_resource::{Coordinator, Pool};
use tokio::signal;
use tracing::Instrument;

use crate::config::AppConfig;
use crate::heartbeat::Heartbeat;
use crate::publisher::PublisherFactory;

/// Pooled broker publisher with graceful shutdown
#[derive(Parser, Debug)]
#[command(name = "moorage", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "MOORAGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Flags that take precedence over file and environment
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Broker address (host:port)
    #[arg(long, global = true)]
    broker: Option<String>,

    /// Handles created at startup
    #[arg(long, global = true)]
    min_size: Option<usize>,

    /// Maximum pooled handles
    #[arg(long, global = true)]
    max_size: Option<usize>,

    /// Log filter, e.g. "info,moorage_resource=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the publisher until interrupted
    Run,
    /// Validate and print the resolved configuration as JSON
    CheckConfig,
}

impl Overrides {
    fn apply(&self, mut figment: Figment) -> Figment {
        if let Some(broker) = &self.broker {
            figment = figment.merge(Serialized::default("broker.address", broker));
        }
        if let Some(min) = self.min_size {
            figment = figment.merge(Serialized::default("pool.min_size", min));
        }
        if let Some(max) = self.max_size {
            figment = figment.merge(Serialized::default("pool.max_size", max));
        }
        if let Some(level) = &self.log_level {
            figment = figment.merge(Serialized::default("log.level", level));
        }
        figment
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut figment = AppConfig::figment(cli.config.as_deref())?;
    // MOORAGE_LOG / RUST_LOG sit between the file and the flags.
    let env_log = moorage_log::Config::from_env();
    if std::env::var_os("MOORAGE_LOG").is_some() || std::env::var_os("RUST_LOG").is_some() {
        figment = figment.merge(Serialized::default("log.level", env_log.level));
    }
    if std::env::var_os("MOORAGE_LOG_FORMAT").is_some() {
        figment = figment.merge(Serialized::default("log.format", env_log.format));
    }
    AppConfig::extract(&cli.overrides.apply(figment))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::CheckConfig => {
            let rendered =
                serde_json::to_string_pretty(&config).context("failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let log = moorage_log::init_with(config.log.clone().with_service("moorage"))
        .context("failed to initialize logging")?;
    serve(config).instrument(log.root_span().clone()).await
}

async fn serve(config: AppConfig) -> Result<()> {
    let pool = Pool::new(PublisherFactory::from_config(&config), config.pool.clone())?;

    let mut coordinator = Coordinator::new();
    coordinator.attach("publisher", pool.clone())?;
    if config.heartbeat.enabled {
        coordinator.attach("heartbeat", Heartbeat::new(pool.clone(), config.heartbeat.clone()))?;
    }

    tracing::info!(
        broker = %config.broker.address,
        exchange = %config.broker.exchange,
        max_size = config.pool.max_size,
        "Starting moorage"
    );
    coordinator.run_until(shutdown_signal()).await?;

    let stats = pool.stats();
    tracing::info!(
        acquisitions = stats.total_acquisitions,
        destroyed = stats.destroyed,
        "Shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
