//! roster-sync - Replicates a membership roster between production and staging
//!
//! This is the command-line entry point. It exits non-zero only when a run
//! could not start; partial failures are reported in the summary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use roster_sync::config::Config;
use roster_sync::error::AppError;
use roster_sync::models::{Direction, SyncResult};
use roster_sync::sync::SyncEngine;
use roster_sync::telemetry::init_tracing;

/// roster-sync - Replicates a membership roster between production and staging
#[derive(Parser, Debug)]
#[command(name = "roster-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "ROSTER_SYNC_CONFIG")]
    config: Option<String>,

    /// Load environment variables from this file before reading configuration
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Copy production into staging
    Pull,
    /// Copy staging into production
    Push,
}

impl From<Command> for Direction {
    fn from(command: Command) -> Self {
        match command {
            Command::Pull => Direction::Pull,
            Command::Push => Direction::Push,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    load_env_file(&args)?;

    // Load configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    init_tracing(&config.logging).map_err(|e| AppError::Telemetry(e.to_string()))?;

    let direction = Direction::from(args.command);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        direction = %direction,
        "Starting roster-sync"
    );

    let engine = SyncEngine::new(config);
    let result = engine.run(direction).await.map_err(AppError::from)?;

    report(&result, args.json)?;
    Ok(())
}

fn load_env_file(args: &Args) -> anyhow::Result<()> {
    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?;
        }
        None => {
            // A missing .env in the working directory is fine
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path)
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env()
        }
    }
    .map_err(AppError::from)?;

    config.validate().map_err(AppError::from)?;
    Ok(config)
}

fn report(result: &SyncResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{}", result.summary());
    for error in &result.errors {
        println!("  - {}", error);
    }
    if !result.is_clean() {
        warn!(errors = result.errors.len(), "Sync finished with errors");
    }
    Ok(())
}
