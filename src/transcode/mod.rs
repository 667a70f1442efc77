//! Transcoding engine.
//!
//! Produces one MP3 artifact per configured quality tier for a source file.
//! The actual encoding is behind the [`Encoder`] trait so the engine can be
//! driven by a fake in tests; production uses [`ffmpeg::FfmpegEncoder`].
//!
//! Per tier:
//! - an existing `{output_dir}/{base}_{tier}.mp3` is reused without invoking
//!   the encoder
//! - otherwise the encoder writes to `{key}.part`, which is renamed into place
//!   only on success
//! - a failed tier becomes a [`StageError`] and the next tier still runs

pub mod ffmpeg;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{
    Bitrate, EncodedArtifact, ObjectKey, QualityTier, QualityVariant, SourceFile, Stage,
    StageError, format_mb,
};

/// Errors from a single encoder invocation.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Encoder '{0}' not found")]
    NotFound(String),

    #[error("Failed to run encoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Encoder exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("Encoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability to encode one input at one bitrate.
///
/// Implement this trait to substitute the encoder in tests.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Version string of the encoder; fails if it is not usable at all.
    async fn version(&self) -> Result<String, EncodeError>;

    /// Encode `input` to MP3 at `bitrate`, writing `output`.
    ///
    /// Must overwrite `output` if it exists and copy the input's tags.
    async fn encode(&self, input: &Path, output: &Path, bitrate: Bitrate)
    -> Result<(), EncodeError>;
}

/// Outcome of one tier.
pub type TranscodeResult = Result<EncodedArtifact, StageError>;

/// Produces the configured variants of a source file.
pub struct Transcoder {
    encoder: Arc<dyn Encoder>,
    variants: Vec<QualityVariant>,
    output_dir: PathBuf,
}

impl Transcoder {
    /// `variants` are processed in the order given.
    pub fn new(
        encoder: Arc<dyn Encoder>,
        variants: Vec<QualityVariant>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            encoder,
            variants,
            output_dir: output_dir.into(),
        }
    }

    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    /// Local path of a tier's artifact.
    pub fn output_path(&self, key: &ObjectKey) -> PathBuf {
        self.output_dir.join(key.as_str())
    }

    /// Produce every configured variant of `source`.
    ///
    /// No new encode starts once `cancel` fires; those tiers report an error.
    pub async fn transcode(
        &self,
        source: &SourceFile,
        cancel: &CancellationToken,
    ) -> Vec<(QualityTier, TranscodeResult)> {
        let mut results = Vec::with_capacity(self.variants.len());
        for variant in &self.variants {
            let result = if cancel.is_cancelled() {
                Err(StageError::new(Stage::Transcode, "run cancelled"))
            } else {
                self.transcode_variant(source, variant).await
            };
            results.push((variant.tier, result));
        }
        results
    }

    async fn transcode_variant(
        &self,
        source: &SourceFile,
        variant: &QualityVariant,
    ) -> TranscodeResult {
        let key = ObjectKey::variant(&source.base_name, variant.tier);
        let path = self.output_path(&key);

        if let Ok(meta) = tokio::fs::metadata(&path).await
            && meta.is_file()
        {
            debug!(target: "music_sync::transcode", file = %source.base_name, quality = %variant.tier, "Already encoded, skipping");
            return Ok(EncodedArtifact {
                tier: variant.tier,
                key,
                path,
                size_bytes: meta.len(),
                skipped: true,
            });
        }

        let partial = self.output_dir.join(format!("{}.part", key));
        match self.encode_to(source, variant.bitrate, &partial, &path).await {
            Ok(size_bytes) => {
                info!(
                    target: "music_sync::transcode",
                    file = %source.base_name,
                    quality = %variant.tier,
                    bitrate = %variant.bitrate,
                    size = %format_mb(size_bytes),
                    "Encoded"
                );
                Ok(EncodedArtifact {
                    tier: variant.tier,
                    key,
                    path,
                    size_bytes,
                    skipped: false,
                })
            }
            Err(e) => {
                // Never leave a partial file behind
                let _ = tokio::fs::remove_file(&partial).await;
                warn!(target: "music_sync::transcode", file = %source.base_name, quality = %variant.tier, error = %e, "Encoding failed");
                Err(StageError::new(Stage::Transcode, e.to_string()))
            }
        }
    }

    async fn encode_to(
        &self,
        source: &SourceFile,
        bitrate: Bitrate,
        partial: &Path,
        path: &Path,
    ) -> Result<u64, EncodeError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        self.encoder.encode(&source.path, partial, bitrate).await?;
        tokio::fs::rename(partial, path).await?;
        Ok(tokio::fs::metadata(path).await?.len())
    }
}
