//! Per-file orchestration.
//!
//! For one source file: extract tags, stage embedded artwork locally,
//! transcode every tier, then make sure each produced artifact and the cover
//! exist in the store. Nothing is uploaded for a file that ends up excluded.
//!
//! # Failure model
//!
//! Stage failures (unreadable tags, one tier failing to encode or upload, the
//! cover failing) are absorbed into fallback values or per-tier
//! [`StageError`]s and the file is still published. Only a [`PublishError`]
//! excludes the file from the manifest:
//! - the source is gone when processing starts
//! - no tier could be encoded or reused
//! - the run was cancelled while the file was in flight

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::cover::{self, CoverArt};
use crate::metadata::{self, TrackMetadata};
use crate::model::{ObjectKey, PublishedTrack, SourceFile, Stage, StageError};
use crate::store::{Gateway, ObjectStore};
use crate::transcode::{EncodeError, Encoder, Transcoder};

/// Reasons a whole file is left out of the manifest.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Source file is missing: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("No quality variant could be produced ({0})")]
    NoVariantsEncoded(String),

    #[error("Run cancelled before the file finished")]
    Cancelled,
}

/// Publishes single files. Shared by all pipeline workers.
pub struct Publisher {
    cover_dir: PathBuf,
    transcoder: Transcoder,
    gateway: Arc<Gateway>,
}

impl Publisher {
    pub fn new(cover_dir: impl Into<PathBuf>, transcoder: Transcoder, gateway: Arc<Gateway>) -> Self {
        Self {
            cover_dir: cover_dir.into(),
            transcoder,
            gateway,
        }
    }

    /// Wire a publisher from configuration and the two external capabilities.
    pub fn from_config(config: &Config, encoder: Arc<dyn Encoder>, store: Arc<dyn ObjectStore>) -> Self {
        let transcoder = Transcoder::new(encoder, config.qualities.variants(), &config.paths.output_dir);
        let gateway = Gateway::from_config(store, &config.store);
        Self::new(&config.paths.cover_dir, transcoder, Arc::new(gateway))
    }

    /// Check the encoder is usable at all. Returns its version line.
    pub async fn preflight(&self) -> Result<String, EncodeError> {
        self.transcoder.encoder().version().await
    }

    pub async fn publish(
        &self,
        source: &SourceFile,
        cancel: &CancellationToken,
    ) -> Result<PublishedTrack, PublishError> {
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        if !tokio::fs::try_exists(&source.path).await.unwrap_or(false) {
            return Err(PublishError::SourceMissing(source.path.clone()));
        }

        info!(target: "music_sync::publisher", file = %source.file_name(), "Processing");

        let mut metadata = self.extract(source).await;
        let staged_cover = match metadata.artwork.take() {
            Some(art) => self.stage_cover(&source.base_name, &art).await,
            None => None,
        };

        let variants = self.transcoder.transcode(source, cancel).await;
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        if variants.iter().all(|(_, result)| result.is_err()) {
            let reasons: Vec<String> = variants
                .iter()
                .filter_map(|(tier, result)| result.as_ref().err().map(|e| format!("{}: {}", tier, e)))
                .collect();
            return Err(PublishError::NoVariantsEncoded(reasons.join("; ")));
        }

        let mut qualities = BTreeMap::new();
        for (tier, result) in variants {
            let slot = match result {
                Ok(artifact) => self
                    .gateway
                    .upload_once(&artifact.path, &artifact.key)
                    .await
                    .map_err(|e| {
                        warn!(target: "music_sync::publisher", file = %source.base_name, quality = %tier, error = %e, "Upload failed");
                        StageError::new(Stage::Upload, e.to_string())
                    }),
                Err(e) => Err(e),
            };
            qualities.insert(tier, slot);
        }

        let cover_key = match staged_cover {
            Some((path, key)) => self.upload_cover(&source.base_name, &path, &key).await,
            None => None,
        };

        let track = PublishedTrack {
            filename: source.base_name.clone(),
            metadata,
            cover_key,
            qualities,
        };
        info!(
            target: "music_sync::publisher",
            file = %source.file_name(),
            uploaded = track.uploaded_count(),
            tiers = track.qualities.len(),
            "Published"
        );
        Ok(track)
    }

    /// Tag reading is blocking IO, so it runs off the async workers.
    async fn extract(&self, source: &SourceFile) -> TrackMetadata {
        let owned = source.clone();
        match tokio::task::spawn_blocking(move || metadata::extract(&owned)).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(target: "music_sync::publisher", file = %source.file_name(), error = %e, "Metadata task failed, using defaults");
                TrackMetadata::fallback(&source.base_name)
            }
        }
    }

    /// Write artwork to the cover directory. `None` if it can't be staged.
    async fn stage_cover(&self, base_name: &str, art: &CoverArt) -> Option<(PathBuf, ObjectKey)> {
        if !art.is_jpeg() {
            warn!(target: "music_sync::publisher", file = %base_name, mime = %art.mime_type, "Cover art is not JPEG, publishing it under a .jpg key anyway");
        }
        match cover::stage(&self.cover_dir, base_name, art).await {
            Ok(staged) => Some(staged),
            Err(e) => {
                let e = StageError::new(Stage::Cover, e.to_string());
                warn!(target: "music_sync::publisher", file = %base_name, error = %e, "Cover art not staged");
                None
            }
        }
    }

    /// `None` unless the cover is confirmed remote.
    async fn upload_cover(&self, base_name: &str, path: &Path, key: &ObjectKey) -> Option<ObjectKey> {
        match self.gateway.upload_once(path, key).await {
            Ok(uploaded) => {
                debug!(target: "music_sync::publisher", file = %base_name, key = %uploaded.key, "Cover art published");
                Some(uploaded.key)
            }
            Err(e) => {
                let e = StageError::new(Stage::Cover, e.to_string());
                warn!(target: "music_sync::publisher", file = %base_name, error = %e, "Cover art not published");
                None
            }
        }
    }
}
