//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `sync`: run the publishing pipeline
//! - `check`: verify the encoder and store credentials

mod check;
mod sync;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;

pub use check::cmd_check;
pub use sync::cmd_sync;

/// Publish a folder of audio files to an object store
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: music-sync/config.toml in the OS config directory)
    #[arg(short, long, global = true, env = "MUSIC_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Encode, upload and publish every track, then write the manifest
    Sync(SyncArgs),
    /// Check that the encoder and store credentials are usable
    Check,
}

/// Overrides for the `[paths]` and `[pipeline]` config sections
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Directory with the audio files to publish
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Directory for encoded variants
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Directory for staged cover art
    #[arg(long)]
    pub covers: Option<PathBuf>,
    /// Manifest file to write
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,
    /// Number of files processed concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,
    /// Include files in subdirectories of the input directory
    #[arg(short, long)]
    pub recursive: bool,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<ExitCode> {
    let rt = Runtime::new()?;

    match &cli.command {
        Commands::Sync(args) => cmd_sync(&rt, cli.config.as_deref(), args),
        Commands::Check => cmd_check(&rt, cli.config.as_deref()),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Print installation instructions for ffmpeg
pub(crate) fn print_ffmpeg_install_instructions(program: &str) {
    eprintln!("Error: {} not found.", program);
    eprintln!("Install ffmpeg:");
    eprintln!("  Windows: winget install Gyan.FFmpeg");
    eprintln!("  macOS:   brew install ffmpeg");
    eprintln!("  Linux:   apt install ffmpeg");
    eprintln!("Or set [encoder] program in the config file to its full path.");
}
