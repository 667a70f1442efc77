//! Music Sync - publish a folder of audio files to an object store.
//!
//! Each input file is transcoded into a set of MP3 quality tiers, uploaded
//! together with its embedded cover art, and listed in a `tracks.json`
//! manifest for the playback client.

pub mod cli;
pub mod config;
pub mod cover;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod publisher;
pub mod scanner;
pub mod store;
#[cfg(test)]
pub mod test_utils;
pub mod transcode;

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<ExitCode> {
    let args = cli::Cli::parse();

    // Initialize logging
    let default_level = if args.verbose {
        "music_sync=debug"
    } else {
        "music_sync=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive(default_level.parse()?))
        .init();

    cli::run_command(&args)
}
