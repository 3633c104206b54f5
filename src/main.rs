//! smoothframe
//!
//! Command-line front end for the frame-interpolation job queue.
//!
//! # Usage
//!
//! ```bash
//! smoothframe run --factor 3 --output-dir out/ clips/
//! smoothframe probe clip.mp4
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use smoothframe::adapters::QueueConfig;
use smoothframe::cli::{commands, Cli, Commands};
use smoothframe::utils::{init_logging, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = QueueConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&LoggingConfig {
        level: cli.log_level.clone().unwrap_or_else(|| config.log_level.clone()),
        json: cli.log_json || config.log_json,
    });
    debug!(?config, "Configuration resolved");

    match cli.command {
        Commands::Run(args) => {
            info!("Executing run command");
            commands::run(args, &config).await?;
        }
        Commands::Probe(args) => {
            commands::probe(args, &config).await?;
        }
    }

    Ok(())
}
