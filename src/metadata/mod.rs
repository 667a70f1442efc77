//! Audio file metadata extraction.
//!
//! Uses the lofty crate for format-independent tag access across MP3, FLAC,
//! OGG, M4A/AAC and WAV files.
//!
//! Extraction never fails from the caller's point of view: [`extract`] falls
//! back to filename-derived defaults when the tags can't be read, so a file
//! with corrupt tags still gets published.

use anyhow::{Context, Result};
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::Accessor;
use std::path::Path;
use tracing::{debug, warn};

use crate::cover::{self, CoverArt};
use crate::model::SourceFile;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_GENRE: &str = "Unknown Genre";

/// Descriptive metadata for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    /// First embedded picture, if any
    pub artwork: Option<CoverArt>,
}

impl TrackMetadata {
    /// Defaults used when a file's tags can't be read at all.
    pub fn fallback(base_name: &str) -> Self {
        Self {
            title: base_name.to_string(),
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            genre: UNKNOWN_GENRE.to_string(),
            year: None,
            track_number: None,
            artwork: None,
        }
    }
}

/// Extract metadata from a source file, falling back to defaults on any error.
pub fn extract(source: &SourceFile) -> TrackMetadata {
    match read(&source.path, &source.base_name) {
        Ok(meta) => {
            debug!(
                target: "music_sync::metadata",
                file = %source.file_name(),
                title = %meta.title,
                artist = %meta.artist,
                artwork = meta.artwork.is_some(),
                "Read tags"
            );
            meta
        }
        Err(e) => {
            warn!(target: "music_sync::metadata", file = %source.file_name(), error = %format!("{:#}", e), "Could not extract metadata, using defaults");
            TrackMetadata::fallback(&source.base_name)
        }
    }
}

/// Read tags from a file. Missing individual fields fall back to defaults;
/// an unreadable file is an error.
pub fn read(path: &Path, base_name: &str) -> Result<TrackMetadata> {
    let tagged_file = Probe::open(path)
        .context("Failed to open file for probing")?
        .read()
        .context("Failed to read file metadata")?;

    // Get the primary tag, or fall back to the first available tag
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        return Ok(TrackMetadata::fallback(base_name));
    };

    let non_empty = |value: Option<std::borrow::Cow<'_, str>>| {
        value
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    Ok(TrackMetadata {
        title: non_empty(tag.title()).unwrap_or_else(|| base_name.to_string()),
        artist: non_empty(tag.artist()).unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        album: non_empty(tag.album()).unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        genre: non_empty(tag.genre()).unwrap_or_else(|| UNKNOWN_GENRE.to_string()),
        year: tag.year(),
        track_number: tag.track(),
        artwork: cover::first_picture(tag),
    })
}
