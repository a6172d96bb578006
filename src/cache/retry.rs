//! Retry with exponential backoff for cache fetches.

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::CacheConfig;

/// How failed fetches are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay between retries (backoff is capped here)
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            retries: config.retry,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    /// `min(base * 2^attempt, max)` for the zero-based retry number.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retries are spent. A rate-limit response waits at least its
    /// `Retry-After`, still capped at `max_delay`.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    let mut delay = self.delay_for(attempt);
                    if let AppError::RateLimited { retry_after_secs } = &e {
                        delay = delay
                            .max(Duration::from_secs(*retry_after_secs))
                            .min(self.max_delay);
                    }
                    attempt += 1;
                    log::debug!(
                        "Attempt {attempt}/{} failed: {e}. Retrying in {delay:?}",
                        self.retries + 1
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
