//! Core data models for the publishing pipeline.
//!
//! Defines the entities that flow between stages:
//! - [`SourceFile`] - one discovered local audio input
//! - [`QualityTier`] / [`Bitrate`] - the configured encoding tiers
//! - [`ObjectKey`] - deterministic remote names for artifacts
//! - [`EncodedArtifact`] - one transcoded variant on local disk
//! - [`PublishedTrack`] - everything the manifest needs about one file
//!
//! Stage-level failures are plain values ([`StageError`]) stored in the
//! per-variant slots of a [`PublishedTrack`], never propagated as errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::metadata::TrackMetadata;

/// One local audio input discovered by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name without its extension; the stem of every derived key
    pub base_name: String,
    /// Absolute path to the source
    pub path: PathBuf,
    /// Lowercased extension without the dot
    pub extension: String,
}

impl SourceFile {
    /// Build a source from a path. Returns `None` for paths without a
    /// usable file stem.
    pub fn from_path(path: &Path) -> Option<Self> {
        let base_name = path.file_stem()?.to_string_lossy().to_string();
        if base_name.is_empty() {
            return None;
        }
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        Some(Self {
            base_name,
            path,
            extension,
        })
    }

    /// Display name (base name plus extension) for logs.
    pub fn file_name(&self) -> String {
        if self.extension.is_empty() {
            self.base_name.clone()
        } else {
            format!("{}.{}", self.base_name, self.extension)
        }
    }
}

/// Encoding tier. Ordering is low → medium → high, which is also the
/// order variants are produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [QualityTier::Low, QualityTier::Medium, QualityTier::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target audio bitrate in kbps. Written and parsed as `"128k"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bitrate(u32);

impl Bitrate {
    pub const KBPS_64: Bitrate = Bitrate(64);
    pub const KBPS_128: Bitrate = Bitrate(128);

    pub fn from_kbps(kbps: u32) -> Option<Self> {
        (kbps > 0).then_some(Self(kbps))
    }

    pub fn kbps(&self) -> u32 {
        self.0
    }

    /// Value in the form the encoder's `-b:a` flag expects.
    pub fn as_arg(&self) -> String {
        format!("{}k", self.0)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.0)
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_suffix('k')
            .or_else(|| trimmed.strip_suffix('K'))
            .unwrap_or(trimmed);
        let kbps: u32 = digits
            .parse()
            .map_err(|_| format!("invalid bitrate '{}': expected e.g. \"128k\"", s))?;
        Bitrate::from_kbps(kbps).ok_or_else(|| format!("invalid bitrate '{}': must be > 0", s))
    }
}

impl TryFrom<String> for Bitrate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bitrate> for String {
    fn from(value: Bitrate) -> Self {
        value.to_string()
    }
}

/// A (tier, bitrate) pair from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityVariant {
    pub tier: QualityTier,
    pub bitrate: Bitrate,
}

/// Name of an object in the remote store, and of its local artifact file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Key of an encoded variant: `{base}_{tier}.mp3`.
    pub fn variant(base_name: &str, tier: QualityTier) -> Self {
        Self(format!("{}_{}.mp3", base_name, tier))
    }

    /// Key of staged cover art: `{base}_cover.jpg`.
    pub fn cover(base_name: &str) -> Self {
        Self(format!("{}_cover.jpg", base_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased extension of the key, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.0)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Output of transcoding one source at one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub tier: QualityTier,
    pub key: ObjectKey,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// True when an existing local file was reused instead of re-encoding
    pub skipped: bool,
}

/// Pipeline stage a [`StageError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcode,
    Upload,
    Cover,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Transcode => "transcode",
            Stage::Upload => "upload",
            Stage::Cover => "cover",
        })
    }
}

/// A failure absorbed at the sub-file level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

/// A variant that is confirmed present in the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedVariant {
    pub key: ObjectKey,
    pub public_url: String,
    pub size_bytes: u64,
    /// True when the object was already in the store and no put was issued
    pub already_present: bool,
}

/// Per-tier result slot of a published track.
pub type VariantResult = Result<UploadedVariant, StageError>;

/// Result of one Publisher run; the unit aggregated into the manifest.
#[derive(Debug, Clone)]
pub struct PublishedTrack {
    /// Base name of the source file
    pub filename: String,
    pub metadata: TrackMetadata,
    /// Cover object key, set only when the cover is confirmed remote
    pub cover_key: Option<ObjectKey>,
    pub qualities: BTreeMap<QualityTier, VariantResult>,
}

impl PublishedTrack {
    /// Public URL of a tier, if that tier was published.
    pub fn url(&self, tier: QualityTier) -> Option<&str> {
        self.qualities
            .get(&tier)
            .and_then(|r| r.as_ref().ok())
            .map(|v| v.public_url.as_str())
    }

    pub fn uploaded_count(&self) -> usize {
        self.qualities.values().filter(|r| r.is_ok()).count()
    }
}

/// Format a byte count as megabytes with two decimals.
pub fn format_mb(bytes: u64) -> String {
    format!("{:.2}MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_source_file_from_path() {
        let source = SourceFile::from_path(Path::new("/music/My Song.FLAC")).unwrap();
        assert_eq!(source.base_name, "My Song");
        assert_eq!(source.extension, "flac");
        assert_eq!(source.file_name(), "My Song.flac");
    }

    #[test]
    fn test_source_file_without_stem() {
        assert!(SourceFile::from_path(Path::new("/")).is_none());
    }

    #[test]
    fn test_object_keys() {
        assert_eq!(
            ObjectKey::variant("song", QualityTier::Medium).as_str(),
            "song_medium.mp3"
        );
        assert_eq!(ObjectKey::cover("song").as_str(), "song_cover.jpg");
        assert_eq!(
            ObjectKey::from("a.FLAC").extension().as_deref(),
            Some("flac")
        );
    }

    #[test]
    fn test_bitrate_parse() {
        assert_eq!("64k".parse::<Bitrate>().unwrap().kbps(), 64);
        assert_eq!("128".parse::<Bitrate>().unwrap().as_arg(), "128k");
        assert!("0k".parse::<Bitrate>().is_err());
        assert!("fast".parse::<Bitrate>().is_err());
    }

    #[test]
    fn test_tier_ordering() {
        let mut tiers = vec![QualityTier::High, QualityTier::Low, QualityTier::Medium];
        tiers.sort();
        assert_eq!(tiers, QualityTier::ALL.to_vec());
    }

    #[test]
    fn test_format_mb() {
        assert_eq!(format_mb(1024 * 1024), "1.00MB");
        assert_eq!(format_mb(0), "0.00MB");
    }

    proptest! {
        #[test]
        fn variant_key_is_deterministic(base in "[a-zA-Z0-9 _-]{1,40}") {
            for tier in QualityTier::ALL {
                let a = ObjectKey::variant(&base, tier);
                let b = ObjectKey::variant(&base, tier);
                prop_assert_eq!(&a, &b);
                prop_assert!(a.as_str().starts_with(base.as_str()));
                prop_assert!(a.as_str().ends_with(".mp3"));
            }
        }

        #[test]
        fn tiers_never_share_a_key(base in "[a-zA-Z0-9 _-]{1,40}") {
            let low = ObjectKey::variant(&base, QualityTier::Low);
            let medium = ObjectKey::variant(&base, QualityTier::Medium);
            let high = ObjectKey::variant(&base, QualityTier::High);
            prop_assert_ne!(&low, &medium);
            prop_assert_ne!(&medium, &high);
            prop_assert_ne!(&low, &high);
        }
    }
}
