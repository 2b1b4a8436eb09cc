//! crmsync - CRM to analytic store synchronization engine
//!
//! # Usage
//!
//! ```bash
//! # Execute one sync run (mode from SYNC_MODE)
//! crmsync run
//!
//! # Print the resolved configuration
//! crmsync validate
//!
//! # Probe source and destination connectivity
//! crmsync check
//! ```
//!
//! Configuration comes from the environment: `SOURCE_ENDPOINT`,
//! `DESTINATION_CONNECTION`, `SYNC_MODE`, `LOOKBACK_HOURS` and the tuning
//! knobs described in the crate docs. Exit status is non-zero only for
//! fatal errors; per-entity failures are recorded in the run log.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crmsync::config::SyncConfig;
use crmsync::engine::SyncEngine;
use crmsync::sink::{Destination, PostgresDestination};
use crmsync::source::{RestSource, SourceApi};

#[derive(Parser)]
#[command(name = "crmsync")]
#[command(version, about = "CRM to analytic store synchronization engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one sync run (default)
    Run,
    /// Load and print the resolved configuration
    Validate,
    /// Check connectivity to the source and the destination
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config =
        SyncConfig::from_env().context("failed to load configuration from environment")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Validate => validate(config),
        Commands::Check => check(config).await,
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn run(config: SyncConfig) -> Result<()> {
    let source = Arc::new(RestSource::new(config.source_endpoint.clone())?);
    let destination = Arc::new(PostgresDestination::connect(&config.destination_connection)?);
    let engine = SyncEngine::new(config, source, destination);

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(4);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal (Ctrl+C)");
            let _ = shutdown_tx.send(());
        }
    });

    let summary = engine.run(&mut shutdown_rx).await.context("sync run failed")?;

    for unit in &summary.units {
        info!(
            entity = %unit.kind,
            status = %unit.status,
            counts = %unit.counts,
            error = unit.error.as_deref(),
            "unit result"
        );
    }
    // failed units are a run-log matter, not a process failure
    Ok(())
}

fn validate(config: SyncConfig) -> Result<()> {
    println!("✓ Configuration valid!\n");
    println!("Source endpoint:    {}", config.source_endpoint);
    println!("Destination:        {}", config.destination_connection);
    println!("Sync mode:          {}", config.sync_mode);
    println!("Look-back overlap:  {}h", config.lookback_hours);
    println!(
        "Rate limit:         {}",
        if config.requests_per_second == 0 {
            "unlimited".to_string()
        } else {
            format!("{} req/s", config.requests_per_second)
        }
    );
    println!("Max retries:        {}", config.max_retries);
    Ok(())
}

async fn check(config: SyncConfig) -> Result<()> {
    println!("Running connectivity checks...\n");
    let mut all_passed = true;

    print!("Source... ");
    match RestSource::new(config.source_endpoint.clone()) {
        Ok(source) => match source.check().await {
            Ok(()) => println!("✓ reachable"),
            Err(e) => {
                println!("✗ {e}");
                all_passed = false;
            }
        },
        Err(e) => {
            println!("✗ {e}");
            all_passed = false;
        }
    }

    print!("Destination... ");
    match PostgresDestination::connect(&config.destination_connection) {
        Ok(destination) => match destination.check().await {
            Ok(()) => println!("✓ reachable"),
            Err(e) => {
                println!("✗ {e}");
                all_passed = false;
            }
        },
        Err(e) => {
            println!("✗ {e}");
            all_passed = false;
        }
    }

    println!();
    if all_passed {
        println!("All checks passed! ✓");
        Ok(())
    } else {
        anyhow::bail!("some checks failed");
    }
}
