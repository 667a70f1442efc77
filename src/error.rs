//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for run-fatal failures.
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: anything that aborts a whole run
//! - Module-specific errors (e.g. [`ScanError`], [`ManifestError`]) for
//!   detailed handling
//! - Failures that only affect one file or one stage never become an
//!   [`Error`]; see [`crate::publisher::PublishError`] and
//!   [`crate::model::StageError`]

use crate::manifest::ManifestError;
use crate::scanner::ScanError;
use crate::transcode::EncodeError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input discovery error
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The encoder can't be run at all
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(#[from] EncodeError),

    /// Manifest could not be produced
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// True when the encoder binary itself is missing, as opposed to failing.
    pub fn is_encoder_missing(&self) -> bool {
        match self {
            Error::EncoderUnavailable(EncodeError::NotFound(_)) => true,
            Error::WithContext { source, .. } => source.is_encoder_missing(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, EncodeError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::EncoderUnavailable(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}
