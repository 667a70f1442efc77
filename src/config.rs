//! Configuration: a TOML file for pipeline settings, the environment for
//! object-store credentials.
//!
//! The config file is looked up in the OS-standard config directory unless
//! an explicit path is given:
//! - Windows: %APPDATA%\music-sync\config.toml
//! - macOS: ~/Library/Application Support/music-sync/config.toml
//! - Linux: ~/.config/music-sync/config.toml
//!
//! Everything is resolved once at startup into immutable values that are
//! passed to each component; nothing reads ambient state afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::{Bitrate, QualityTier, QualityVariant};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local directories and the manifest location
    pub paths: PathsConfig,

    /// Quality tier → target bitrate
    pub qualities: Qualities,

    /// External encoder settings
    pub encoder: EncoderConfig,

    /// Object store call settings
    pub store: StoreConfig,

    /// Scheduling settings
    pub pipeline: PipelineConfig,
}

/// Local filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Audio sources to publish
    pub input_dir: PathBuf,
    /// Encoded variants (`{base}_{quality}.mp3`)
    pub output_dir: PathBuf,
    /// Staged artwork (`{base}_cover.jpg`)
    pub cover_dir: PathBuf,
    /// Manifest document written at the end of a run
    pub manifest: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("music_content/music_to_sync"),
            output_dir: PathBuf::from("music_content/output_converted"),
            cover_dir: PathBuf::from("music_content/cover_art"),
            manifest: PathBuf::from("tracks.json"),
        }
    }
}

/// Configured quality tiers. Iterates low → medium → high.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qualities(pub BTreeMap<QualityTier, Bitrate>);

impl Default for Qualities {
    fn default() -> Self {
        Self(BTreeMap::from([
            (QualityTier::Low, Bitrate::KBPS_64),
            (QualityTier::Medium, Bitrate::KBPS_128),
        ]))
    }
}

impl Qualities {
    pub fn variants(&self) -> Vec<QualityVariant> {
        self.0
            .iter()
            .map(|(tier, bitrate)| QualityVariant {
                tier: *tier,
                bitrate: *bitrate,
            })
            .collect()
    }
}

/// External encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoder executable (name on PATH or absolute path)
    pub program: String,
    /// Upper bound for a single encode
    pub timeout_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            timeout_secs: 600,
        }
    }
}

/// Object store call settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound for a single head/put call
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff settings for retryable store errors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Files processed concurrently (1 = one at a time)
    pub jobs: usize,
    /// Descend into subdirectories of the input directory
    pub recursive: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            recursive: false,
        }
    }
}

impl Config {
    /// Check values that serde can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.qualities.0.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one quality tier must be configured".to_string(),
            ));
        }
        if self.pipeline.jobs == 0 {
            return Err(ConfigError::Invalid("pipeline.jobs must be >= 1".to_string()));
        }
        if self.encoder.timeout_secs == 0 || self.store.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be >= 1 second".to_string()));
        }
        if self.store.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "store.retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Store Credentials
// ============================================================================

pub const ENV_ACCOUNT_ID: &str = "CLOUDFLARE_ACCOUNT_ID";
pub const ENV_ACCESS_KEY_ID: &str = "CLOUDFLARE_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "CLOUDFLARE_SECRET_ACCESS_KEY";
pub const ENV_BUCKET_NAME: &str = "CLOUDFLARE_BUCKET_NAME";
pub const ENV_ENDPOINT: &str = "CLOUDFLARE_ENDPOINT";
pub const ENV_PUBLIC_URL: &str = "CLOUDFLARE_PUBLIC_URL";

/// Every environment variable the store reads, in display order.
pub const CREDENTIAL_VARS: [&str; 6] = [
    ENV_ACCOUNT_ID,
    ENV_ACCESS_KEY_ID,
    ENV_SECRET_ACCESS_KEY,
    ENV_BUCKET_NAME,
    ENV_ENDPOINT,
    ENV_PUBLIC_URL,
];

/// Object store connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    pub account_id: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub endpoint: String,
    pub public_url: String,
}

impl StoreCredentials {
    /// R2 ignores regions but the signer needs one
    pub const REGION: &'static str = "auto";

    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through `lookup`. Values are trimmed and empty values
    /// count as missing. All missing names are reported at once.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let account_id = get(ENV_ACCOUNT_ID);
        let access_key_id = get(ENV_ACCESS_KEY_ID);
        let secret_access_key = get(ENV_SECRET_ACCESS_KEY);
        let bucket = get(ENV_BUCKET_NAME);
        let public_url = get(ENV_PUBLIC_URL);
        let endpoint = get(ENV_ENDPOINT).or_else(|| {
            account_id
                .as_ref()
                .map(|id| format!("https://{}.r2.cloudflarestorage.com", id))
        });

        let mut missing = Vec::new();
        if access_key_id.is_none() {
            missing.push(ENV_ACCESS_KEY_ID);
        }
        if secret_access_key.is_none() {
            missing.push(ENV_SECRET_ACCESS_KEY);
        }
        if bucket.is_none() {
            missing.push(ENV_BUCKET_NAME);
        }
        if endpoint.is_none() {
            missing.push(ENV_ENDPOINT);
        }
        if public_url.is_none() {
            missing.push(ENV_PUBLIC_URL);
        }

        match (access_key_id, secret_access_key, bucket, endpoint, public_url) {
            (
                Some(access_key_id),
                Some(secret_access_key),
                Some(bucket),
                Some(endpoint),
                Some(public_url),
            ) => {
                Ok(Self {
                    account_id,
                    access_key_id,
                    secret_access_key,
                    bucket,
                    endpoint,
                    public_url,
                })
            }
            _ => Err(ConfigError::MissingCredentials(missing)),
        }
    }
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("public_url", &self.public_url)
            .finish()
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-sync"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration.
///
/// An explicit `path` must exist and parse. Without one, the default
/// location is used if present, otherwise built-in defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(path) => read_file(path)?,
        None => match config_path() {
            Some(path) if path.exists() => read_file(&path)?,
            _ => {
                tracing::info!(target: "music_sync::config", "No config file found, using defaults");
                Config::default()
            }
        },
    };

    config.validate()?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config: Config =
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    tracing::info!(target: "music_sync::config", "Loaded config from {:?}", path);
    Ok(config)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Tests
// ============================================================================
