//! The `sync` command.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{SyncArgs, print_ffmpeg_install_instructions};
use crate::config::{self, Config, StoreCredentials};
use crate::pipeline::{ManifestStatus, Pipeline, RunSummary};
use crate::publisher::Publisher;
use crate::store::s3::S3Store;
use crate::transcode::ffmpeg::FfmpegEncoder;

impl SyncArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.paths.input_dir = input.clone();
        }
        if let Some(output) = &self.output {
            config.paths.output_dir = output.clone();
        }
        if let Some(covers) = &self.covers {
            config.paths.cover_dir = covers.clone();
        }
        if let Some(manifest) = &self.manifest {
            config.paths.manifest = manifest.clone();
        }
        if let Some(jobs) = self.jobs {
            config.pipeline.jobs = jobs;
        }
        if self.recursive {
            config.pipeline.recursive = true;
        }
    }
}

/// Run the publishing pipeline
pub fn cmd_sync(rt: &Runtime, config_path: Option<&Path>, args: &SyncArgs) -> anyhow::Result<ExitCode> {
    let mut config = config::load(config_path)?;
    args.apply(&mut config);
    config.validate()?;
    // Missing credentials must stop the run before any file is touched
    let credentials = StoreCredentials::from_env()?;
    let config = Arc::new(config);

    rt.block_on(async {
        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!(target: "music_sync::pipeline", "Interrupted, finishing in-flight work");
                    cancel.cancel();
                }
            }
        });

        let encoder = Arc::new(FfmpegEncoder::from_config(&config.encoder));
        let store = Arc::new(S3Store::new(&credentials));
        let publisher = Publisher::from_config(&config, encoder, store);
        let pipeline = Pipeline::new(config.clone(), publisher, cancel);

        match pipeline.run().await {
            Ok(summary) => {
                print_summary(&summary);
                Ok(ExitCode::from(summary.status().exit_code()))
            }
            Err(e) => {
                if e.is_encoder_missing() {
                    print_ffmpeg_install_instructions(&config.encoder.program);
                }
                Err(e.into())
            }
        }
    })
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Sync complete in {:.2}s", summary.elapsed.as_secs_f64());
    println!("  Files found:     {}", summary.discovered);
    println!("  Published:       {}", summary.published);
    if !summary.failed.is_empty() {
        println!("  Failed:          {}", summary.failed.len());
        for failed in &summary.failed {
            println!("    ✗ {}: {}", failed.name, failed.reason);
        }
    }
    if summary.not_started > 0 {
        println!("  Not processed:   {}", summary.not_started);
    }
    println!("  Encoded files:   {}", summary.output_dir.display());
    println!("  Cover art:       {}", summary.cover_dir.display());
    match &summary.manifest {
        ManifestStatus::Written(path) => println!("  Manifest:        {}", path.display()),
        ManifestStatus::NothingToDo => println!("  Manifest:        not written (no audio files found)"),
        ManifestStatus::NoTracksPublished => {
            println!("  Manifest:        not written (no tracks published)")
        }
        ManifestStatus::Cancelled => println!("  Manifest:        not written (run cancelled)"),
    }
}
