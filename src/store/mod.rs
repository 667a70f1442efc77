//! Object store gateway.
//!
//! # Architecture
//!
//! - [`ObjectStore`] - the raw backend: existence check, whole-object put,
//!   public URL resolution. Production uses [`s3::S3Store`].
//! - [`Gateway`] - what the publisher talks to. Adds per-call timeouts,
//!   bounded retry for network-class errors, content-type resolution and
//!   per-key serialization of the exists→put sequence, so a key is uploaded
//!   at most once per run even with concurrent workers.
//!
//! "Object absent" is a normal `Ok(false)` from [`ObjectStore::exists`];
//! every other failure is an error and is never treated as absence.

mod retry;
pub mod s3;

pub use retry::RetryPolicy;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::model::{ObjectKey, UploadedVariant, format_mb};

/// Content type used for unrecognized extensions, so unknown audio
/// formats still upload.
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// Errors from object store calls.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Store returned HTTP {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Failed to read local file {path}: {message}")]
    LocalFile { path: String, message: String },

    #[error("Store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Network-class errors worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Timeout(_) | StoreError::Network(_) => true,
            StoreError::Service { status, .. } => *status >= 500 || *status == 429,
            StoreError::LocalFile { .. } | StoreError::Other(_) => false,
        }
    }
}

/// Acknowledged whole-object put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub public_url: String,
    pub size_bytes: u64,
}

/// Raw object store backend.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether `key` exists. Absence is `Ok(false)`, not an error.
    async fn exists(&self, key: &ObjectKey) -> Result<bool, StoreError>;

    /// Upload the file at `path` under `key` with public-read visibility.
    ///
    /// Must not return until the store has acknowledged the whole object.
    async fn put(
        &self,
        path: &Path,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<PutReceipt, StoreError>;

    /// Public URL an object is served from.
    fn public_url(&self, key: &ObjectKey) -> String;
}

/// Map a key's extension to its MIME type.
pub fn content_type_for_key(key: &ObjectKey) -> &'static str {
    match key.extension().as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("ogg") => "audio/ogg",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// `{base}/{key}` with the key percent-encoded.
pub fn public_url(base: &str, key: &ObjectKey) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(key.as_str())
    )
}

/// Store access used by the publisher.
pub struct Gateway {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    timeout: Duration,
    locks: Mutex<HashMap<ObjectKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl Gateway {
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            store,
            retry,
            timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &StoreConfig) -> Self {
        Self::new(
            store,
            RetryPolicy::new(&config.retry),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn public_url(&self, key: &ObjectKey) -> String {
        self.store.public_url(key)
    }

    /// Make sure `key` exists remotely, uploading `path` only if it doesn't.
    ///
    /// The check and the put run under a per-key lock, so concurrent
    /// callers for the same key issue at most one put. A retry repeats the
    /// whole sequence: a put whose acknowledgement was lost is found by the
    /// next existence check instead of being sent again.
    pub async fn upload_once(
        &self,
        path: &Path,
        key: &ObjectKey,
    ) -> Result<UploadedVariant, StoreError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let uploaded = self
            .call(key, || self.check_then_put(path, key))
            .await?;
        if uploaded.already_present {
            debug!(target: "music_sync::store", key = %key, "Already in store, skipping upload");
        } else {
            info!(target: "music_sync::store", key = %key, size = %format_mb(uploaded.size_bytes), "Uploaded");
        }
        Ok(uploaded)
    }

    async fn check_then_put(
        &self,
        path: &Path,
        key: &ObjectKey,
    ) -> Result<UploadedVariant, StoreError> {
        if self.timed(self.store.exists(key)).await? {
            let size_bytes = tokio::fs::metadata(path)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            return Ok(UploadedVariant {
                key: key.clone(),
                public_url: self.public_url(key),
                size_bytes,
                already_present: true,
            });
        }

        let content_type = content_type_for_key(key);
        let receipt = self.timed(self.store.put(path, key, content_type)).await?;
        Ok(UploadedVariant {
            key: key.clone(),
            public_url: receipt.public_url,
            size_bytes: receipt.size_bytes,
            already_present: false,
        })
    }

    /// Lock for `key`. Entries nobody else holds are dropped on the way, so
    /// the table only keeps keys with uploads in flight.
    fn lock_for(&self, key: &ObjectKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.clone()).or_default().clone()
    }

    /// One store call bounded by the per-call timeout.
    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    async fn call<T, F, Fut>(&self, key: &ObjectKey, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retries = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if self.retry.should_retry(&e, retries) => {
                    let delay = self.retry.backoff(retries);
                    warn!(target: "music_sync::store", key = %key, retry = retries + 1, error = %e, "Retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
