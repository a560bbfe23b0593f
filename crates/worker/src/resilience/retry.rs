//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use processor_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Factor applied to the delay after each retry
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Upper bound on any single delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(32) as i32);
        let delay_ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.multiplier < 1.0 {
            return Err(Error::config("retry.multiplier must be at least 1.0"));
        }
        Ok(())
    }
}

/// A retry configuration paired with the rule deciding which failures are
/// worth another attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    should_retry: fn(&Error) -> bool,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, should_retry: fn(&Error) -> bool) -> Self {
        Self {
            config,
            should_retry,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// the attempts are used up. The last error is returned unchanged.
    pub async fn run<F, Fut, T>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with(operation, op, |_, _| {}).await
    }

    /// Like [`run`](Self::run), calling `on_retry(retry_number, &error)`
    /// before each backoff sleep.
    pub async fn run_with<F, Fut, T, R>(&self, operation: &str, mut op: F, mut on_retry: R) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut(u32, &Error),
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && (self.should_retry)(&e) => {
                    let delay = self.config.backoff(attempt - 1);
                    debug!(
                        operation = operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, will retry"
                    );
                    on_retry(attempt, &e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
