//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Video files or directories to scan for videos
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Interpolation factor applied to the source frame rate (presets: 2, 3, 4, 5, 6, 8)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(2..))]
    pub factor: Option<u32>,

    /// Directory receiving the interpolated files
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// ffmpeg binary; overrides the configuration
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Use the in-memory engine instead of ffmpeg
    #[arg(long)]
    pub simulate: bool,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Video file to probe
    pub path: PathBuf,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}
