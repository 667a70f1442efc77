//! Test utilities and fixtures for music-sync tests.
//!
//! This module provides common test helpers, fake wiring and filesystem
//! layouts to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::TestLayout;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let layout = TestLayout::new();
//!     let source = layout.add_source("song.mp3");
//!     let publisher = layout.publisher(Arc::new(FakeEncoder::new()), Arc::new(MemoryStore::new()));
//!     // ... test logic
//! }
//! ```

use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::{Accessor, Tag, TagExt, TagType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::{Config, PathsConfig, RetryConfig};
use crate::cover::CoverArt;
use crate::metadata::TrackMetadata;
use crate::model::{
    Bitrate, ObjectKey, PublishedTrack, QualityTier, QualityVariant, SourceFile, Stage,
    StageError, UploadedVariant,
};
use crate::publisher::Publisher;
use crate::store::mocks::{MemoryStore, TEST_PUBLIC_URL};
use crate::transcode::mocks::FakeEncoder;

/// The default tiers: low at 64k, medium at 128k.
pub fn default_variants() -> Vec<QualityVariant> {
    vec![
        QualityVariant {
            tier: QualityTier::Low,
            bitrate: Bitrate::KBPS_64,
        },
        QualityVariant {
            tier: QualityTier::Medium,
            bitrate: Bitrate::KBPS_128,
        },
    ]
}

/// Write a placeholder (untagged, undecodable) audio file.
pub fn write_source(dir: &Path, name: &str) -> SourceFile {
    std::fs::create_dir_all(dir).expect("Failed to create source directory");
    let path = dir.join(name);
    std::fs::write(&path, b"not really audio").expect("Failed to write source file");
    SourceFile::from_path(&path).expect("Source name has no stem")
}

/// A short silent mono PCM WAV file.
fn wav_bytes() -> Vec<u8> {
    let samples = [0u8; 1600];
    let mut wav = Vec::with_capacity(44 + samples.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + samples.len() as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&8000u32.to_le_bytes());
    wav.extend_from_slice(&16000u32.to_le_bytes()); // byte rate
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    wav.extend_from_slice(&samples);
    wav
}

/// Write a real WAV file. With a tag, it is saved into the file as ID3v2.
pub fn write_wav_source(dir: &Path, name: &str, tag: Option<&Tag>) -> SourceFile {
    std::fs::create_dir_all(dir).expect("Failed to create source directory");
    let path = dir.join(name);
    std::fs::write(&path, wav_bytes()).expect("Failed to write WAV file");
    if let Some(tag) = tag {
        tag.save_to_path(&path, WriteOptions::default())
            .expect("Failed to save tag");
    }
    SourceFile::from_path(&path).expect("Source name has no stem")
}

/// An ID3v2 tag with title, artist, year 1999, track 7 and a JPEG cover.
pub fn full_tag(title: &str, artist: &str) -> Tag {
    let mut tag = Tag::new(TagType::Id3v2);
    tag.set_title(title.to_string());
    tag.set_artist(artist.to_string());
    tag.set_year(1999);
    tag.set_track(7);
    tag.push_picture(Picture::new_unchecked(
        PictureType::CoverFront,
        Some(MimeType::Jpeg),
        None,
        jpeg_cover().data,
    ));
    tag
}

/// A small JPEG-looking cover.
pub fn jpeg_cover() -> CoverArt {
    CoverArt {
        data: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
        mime_type: "image/jpeg".to_string(),
    }
}

/// A published track with the given tiers uploaded and the rest failed.
///
/// URLs point at the in-memory store's public base.
pub fn published_track(name: &str, uploaded: &[QualityTier]) -> PublishedTrack {
    let qualities = QualityTier::ALL
        .iter()
        .map(|tier| {
            let key = ObjectKey::variant(name, *tier);
            let slot = if uploaded.contains(tier) {
                Ok(UploadedVariant {
                    public_url: format!("{}/{}", TEST_PUBLIC_URL, key),
                    key,
                    size_bytes: 1024,
                    already_present: false,
                })
            } else {
                Err(StageError::new(Stage::Upload, "simulated"))
            };
            (*tier, slot)
        })
        .collect::<BTreeMap<_, _>>();

    PublishedTrack {
        filename: name.to_string(),
        metadata: TrackMetadata::fallback(name),
        cover_key: None,
        qualities,
    }
}

/// A throwaway input/output/cover/manifest layout.
///
/// Nothing but the root exists until a source is added or a run creates
/// the directories. Everything is deleted when the layout is dropped.
pub struct TestLayout {
    _root: TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
    pub covers: PathBuf,
    pub manifest: PathBuf,
}

impl TestLayout {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp directory");
        let base = root.path().to_path_buf();
        Self {
            input: base.join("input"),
            output: base.join("output"),
            covers: base.join("covers"),
            manifest: base.join("tracks.json"),
            _root: root,
        }
    }

    pub fn add_source(&self, name: &str) -> SourceFile {
        write_source(&self.input, name)
    }

    /// Add a WAV source carrying [`full_tag`].
    pub fn add_tagged_source(&self, name: &str, title: &str, artist: &str) -> SourceFile {
        write_wav_source(&self.input, name, Some(&full_tag(title, artist)))
    }

    /// Default configuration pointed at this layout, with fast retries.
    pub fn config(&self) -> Config {
        let mut config = Config {
            paths: PathsConfig {
                input_dir: self.input.clone(),
                output_dir: self.output.clone(),
                cover_dir: self.covers.clone(),
                manifest: self.manifest.clone(),
            },
            ..Config::default()
        };
        config.store.retry = RetryConfig {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 2.0,
        };
        config.store.timeout_secs = 5;
        config
    }

    pub fn publisher(&self, encoder: Arc<FakeEncoder>, store: Arc<MemoryStore>) -> Publisher {
        Publisher::from_config(&self.config(), encoder, store)
    }
}
