//! Retry policy for object store calls.
//!
//! Implements exponential backoff with configurable parameters.

use std::time::Duration;

use super::StoreError;
use crate::config::RetryConfig;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Cap for exponential growth.
    pub max_backoff: Duration,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Backoff before retry number `retry_count` (0-based):
    /// `initial * multiplier^retry_count`, capped at `max_backoff`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let millis = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(retry_count as i32);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether `error` should be retried after `retry_count` retries so far.
    pub fn should_retry(&self, error: &StoreError, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
