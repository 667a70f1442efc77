//! Manifest generation.
//!
//! Turns the ordered list of published tracks into the `tracks.json`
//! document consumed by the playback client. Every run replaces the previous
//! manifest wholesale; the write goes through a temp file and a rename so
//! readers never see a half-written document.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::{PublishedTrack, QualityTier};

/// Tier used for `streamUrl`, in order of preference.
pub const STREAM_PRECEDENCE: [QualityTier; 3] =
    [QualityTier::Medium, QualityTier::Low, QualityTier::High];

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write manifest {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub total_tracks: usize,
    pub generated_at: String,
    pub tracks: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// 1-based position in this run's output
    pub id: usize,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: Option<u32>,
    pub track: Option<u32>,
    pub filename: String,
    pub cover_art: Option<String>,
    pub qualities: QualityUrls,
    pub stream_url: Option<String>,
    pub uploaded_at: String,
}

/// Public URL per tier; `null` when that tier wasn't published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityUrls {
    pub low: Option<String>,
    pub medium: Option<String>,
    pub high: Option<String>,
}

impl QualityUrls {
    fn from_track(track: &PublishedTrack) -> Self {
        let url = |tier| track.url(tier).map(str::to_string);
        Self {
            low: url(QualityTier::Low),
            medium: url(QualityTier::Medium),
            high: url(QualityTier::High),
        }
    }
}

/// Best available playback URL: medium, then low, then high.
pub fn stream_url(track: &PublishedTrack) -> Option<String> {
    STREAM_PRECEDENCE
        .iter()
        .find_map(|tier| track.url(*tier))
        .map(str::to_string)
}

/// Build the manifest for `tracks`, which must already be in discovery order.
///
/// `generated_at` is used for both `generatedAt` and every `uploadedAt`.
pub fn build(tracks: &[PublishedTrack], generated_at: DateTime<Utc>) -> Manifest {
    let timestamp = generated_at.to_rfc3339_opts(SecondsFormat::Millis, true);

    let entries = tracks
        .iter()
        .enumerate()
        .map(|(index, track)| ManifestEntry {
            id: index + 1,
            title: track.metadata.title.clone(),
            artist: track.metadata.artist.clone(),
            album: track.metadata.album.clone(),
            genre: track.metadata.genre.clone(),
            year: track.metadata.year,
            track: track.metadata.track_number,
            filename: track.filename.clone(),
            cover_art: track.cover_key.as_ref().map(|k| k.to_string()),
            qualities: QualityUrls::from_track(track),
            stream_url: stream_url(track),
            uploaded_at: timestamp.clone(),
        })
        .collect::<Vec<_>>();

    Manifest {
        total_tracks: entries.len(),
        generated_at: timestamp,
        tracks: entries,
    }
}

/// Write `manifest` to `path`, replacing any previous file in one step.
pub async fn write(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    let json = serde_json::to_vec_pretty(manifest)?;
    let io_error = |source: std::io::Error| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    if let Err(e) = tokio::fs::write(&temp, &json).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(io_error(e));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(io_error(e));
    }

    info!(target: "music_sync::manifest", path = %path.display(), tracks = manifest.total_tracks, "Manifest written");
    Ok(())
}
