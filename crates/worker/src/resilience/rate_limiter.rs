//! Global interval rate limiter.
//!
//! Grants at most one permit per interval across all callers. Permits are
//! handed out as reserved time slots: a caller whose slot lies further
//! away than the configured timeout is refused immediately with
//! `PermitTimeout` and reserves nothing.

use std::time::Duration;

use parking_lot::Mutex;
use processor_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Minimum spacing between permits
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Longest a caller may wait for a permit
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    15_000
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RateLimiterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::config("rate_limit.interval_ms must be positive"));
        }
        Ok(())
    }
}

/// One-permit-per-interval limiter shared by every dispatch.
#[derive(Debug)]
pub struct IntervalRateLimiter {
    name: String,
    config: RateLimiterConfig,
    /// Earliest instant the next permit may be granted
    next_slot: Mutex<Option<Instant>>,
}

impl IntervalRateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            next_slot: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Waits for a permit, at most `timeout_ms`.
    pub async fn acquire(&self) -> Result<()> {
        let now = Instant::now();
        let timeout = self.config.timeout();

        let slot = {
            let mut next = self.next_slot.lock();
            let slot = next.map_or(now, |n| n.max(now));
            if slot - now > timeout {
                debug!(limiter = %self.name, wait_ms = (slot - now).as_millis() as u64, "No permit within timeout");
                return Err(Error::PermitTimeout(timeout));
            }
            *next = Some(slot + self.config.interval());
            slot
        };

        if slot > now {
            debug!(limiter = %self.name, wait_ms = (slot - now).as_millis() as u64, "Waiting for permit");
            tokio::time::sleep_until(slot).await;
        }
        Ok(())
    }
}
