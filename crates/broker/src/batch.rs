//! Size-or-time batch window over a record channel.

use std::time::Duration;

use processor_core::limits::MAX_ANALYTICS_BATCH_SIZE;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

/// Batch window configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum records per window
    pub max_size: usize,
    /// Maximum time a window stays open after its first record
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: MAX_ANALYTICS_BATCH_SIZE,
            max_wait: Duration::from_millis(1000),
        }
    }
}

/// Collects records from a channel into windows.
///
/// A window opens when its first record arrives and closes at whichever
/// comes first: `max_size` records, or `max_wait` elapsed since opening.
/// Records keep channel order.
#[derive(Debug, Clone, Copy)]
pub struct BatchWindow {
    config: BatchConfig,
}

impl BatchWindow {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config: BatchConfig {
                max_size: config.max_size.max(1),
                max_wait: config.max_wait,
            },
        }
    }

    pub fn config(&self) -> BatchConfig {
        self.config
    }

    /// Waits for the next window.
    ///
    /// Returns `None` once the channel is closed and drained. A channel that
    /// closes mid-window yields the partial window first.
    pub async fn next_batch<T>(&self, rx: &mut mpsc::Receiver<T>) -> Option<Vec<T>> {
        let first = rx.recv().await?;
        let deadline = Instant::now() + self.config.max_wait;

        let mut batch = Vec::with_capacity(self.config.max_size);
        batch.push(first);

        while batch.len() < self.config.max_size {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some(item)) => batch.push(item),
                Ok(None) | Err(_) => break,
            }
        }

        Some(batch)
    }
}

impl Default for BatchWindow {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}
