//! Explicit execution-time instrumentation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::metrics::Counter;

/// Output of a timed future.
#[derive(Debug)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Measures how long `fut` takes to complete.
pub async fn timed<F: Future>(fut: F) -> Timed<F::Output> {
    let start = Instant::now();
    let value = fut.await;
    Timed {
        value,
        elapsed: start.elapsed(),
    }
}

/// Runs `fut`, logs the labeled duration, and adds it to `total_ms`.
pub async fn track_execution_time<F: Future>(
    label: &str,
    total_ms: &Counter,
    fut: F,
) -> F::Output {
    let result = timed(fut).await;
    let elapsed_ms = result.elapsed_ms();
    total_ms.inc_by(elapsed_ms);
    info!(label = label, elapsed_ms = elapsed_ms, "[Timing] {} took {} ms", label, elapsed_ms);
    result.value
}
