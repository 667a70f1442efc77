//! The `check` command: environment diagnostics without processing files.

use std::path::Path;
use std::process::ExitCode;
use tokio::runtime::Runtime;

use super::print_ffmpeg_install_instructions;
use crate::config::{self, CREDENTIAL_VARS, ENV_SECRET_ACCESS_KEY, StoreCredentials};
use crate::transcode::ffmpeg::FfmpegEncoder;
use crate::transcode::{EncodeError, Encoder};

/// Check encoder availability and store credentials
pub fn cmd_check(rt: &Runtime, config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let config = config::load(config_path)?;
    let mut ok = true;

    println!("Checking publishing environment...\n");

    println!("Encoder:");
    let encoder = FfmpegEncoder::from_config(&config.encoder);
    match rt.block_on(encoder.version()) {
        Ok(version) => println!("✓ {}: {}", encoder.program(), version),
        Err(EncodeError::NotFound(program)) => {
            ok = false;
            println!("✗ {}: NOT FOUND", program);
            print_ffmpeg_install_instructions(&program);
        }
        Err(e) => {
            ok = false;
            println!("✗ {}: {}", encoder.program(), e);
        }
    }

    println!();
    println!("Store credentials:");
    for name in CREDENTIAL_VARS {
        let value = std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty());
        match value {
            Some(value) => println!("✓ {}: {}", name, display_value(name, &value)),
            None => println!("- {}: not set", name),
        }
    }
    match StoreCredentials::from_env() {
        Ok(credentials) => {
            println!();
            println!("  Endpoint:   {}", credentials.endpoint);
            println!("  Bucket:     {}", credentials.bucket);
            println!("  Public URL: {}", credentials.public_url);
        }
        Err(e) => {
            ok = false;
            println!("✗ {}", e);
        }
    }

    println!();
    println!("Directories:");
    for (label, dir) in [
        ("Input", &config.paths.input_dir),
        ("Output", &config.paths.output_dir),
        ("Cover art", &config.paths.cover_dir),
    ] {
        let state = if dir.is_dir() { "exists" } else { "will be created" };
        println!("  {}: {} ({})", label, dir.display(), state);
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

/// Secrets are never echoed.
fn display_value(name: &str, value: &str) -> String {
    if name == ENV_SECRET_ACCESS_KEY {
        "********".to_string()
    } else {
        value.to_string()
    }
}
