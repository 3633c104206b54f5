//! CLI module for smoothframe
//!
//! Argument parsing and command execution for the command-line front end.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

pub use args::{ProbeArgs, RunArgs};

/// smoothframe - frame-rate upsampling through a single-flight job queue
///
/// Every input is probed, queued and transcoded one at a time with a
/// motion-compensated interpolation filter.
#[derive(Parser, Debug)]
#[command(name = "smoothframe")]
#[command(about = "Frame-interpolate videos through a single-flight job queue")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./smoothframe.toml when present)
    #[arg(long, global = true, env = "SMOOTHFRAME_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive; overrides the configuration
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interpolate every video found under the given paths
    Run(RunArgs),
    /// Print the duration and frame rate of a video as JSON
    Probe(ProbeArgs),
}
