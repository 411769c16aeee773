//! Retry manager for handling transient failures with exponential backoff
//!
//! Every storage call made during a sync run goes through [`RetryManager`];
//! row operations are deliberately not retried.

use crate::config::RetryConfig;
use crate::error::RetryableError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry manager with exponential backoff support
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    /// Create a new RetryManager with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a RetryManager with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Execute an async operation with retry logic
    ///
    /// The operation is invoked at most `max_attempts` times. After the n-th
    /// failed attempt the manager sleeps `base_delay * multiplier^(n-1)`,
    /// capped at `max_delay`. Errors that are not retryable are returned
    /// immediately; otherwise the last observed error is returned once all
    /// attempts are used up.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= max_attempts {
                        warn!(
                            attempts = attempt,
                            max_attempts = max_attempts,
                            error = %err,
                            "Max attempts exhausted"
                        );
                        return Err(err);
                    }

                    let backoff = self.delay_after(&err, attempt);
                    debug!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        backoff_ms = backoff.as_millis(),
                        error = %err,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Calculate the delay that follows the given failed attempt (1-based)
    ///
    /// Uses exponential backoff: base_delay * multiplier^(attempt-1),
    /// capped at max_delay with optional jitter
    pub fn calculate_backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1) as i32;
        let base =
            self.config.base_delay_ms as f64 * self.config.backoff_multiplier.powi(exponent);
        let capped = base.min(self.config.max_delay_ms as f64);

        let delay = if self.config.jitter {
            // Add jitter: 50-100% of the calculated backoff
            let jitter = rand::thread_rng().gen_range(0.5..1.0);
            capped * jitter
        } else {
            capped
        };

        Duration::from_millis(delay.max(0.0) as u64)
    }

    /// Delay before the next attempt: the backoff, or longer if the error
    /// asks for it
    pub fn delay_after<E: RetryableError>(&self, err: &E, failed_attempt: u32) -> Duration {
        let backoff = self.calculate_backoff(failed_attempt);
        err.retry_after().map_or(backoff, |wait| wait.max(backoff))
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
