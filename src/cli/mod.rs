//! Command-line interface for music-sync.
//!
//! This module provides the `sync` command that runs the publishing
//! pipeline and the `check` command that verifies the environment.

mod commands;

pub use commands::{Cli, Commands, run_command};
