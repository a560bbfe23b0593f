//! Rate-limited dispatch of batches to the analytics backend.

use std::sync::Arc;

use gateway::AnalyticsGateway;
use processor_core::{AnalyticsBatchResponse, Batch, Error, ErrorKind, Result};
use telemetry::{timed, Metrics};
use tracing::{info, warn};

use crate::resilience::{CircuitBreaker, IntervalRateLimiter, RetryPolicy};

/// Quota rejections end a dispatch at once; so does an open breaker.
/// Everything else, including other 4xx and permit timeouts, is retried.
pub fn is_retryable_dispatch_error(error: &Error) -> bool {
    !matches!(error.kind(), ErrorKind::Quota | ErrorKind::CircuitOpen)
}

/// Sends batches through the shared limiter and breaker.
pub struct AnalyticsDispatcher {
    gateway: Arc<dyn AnalyticsGateway>,
    limiter: Arc<IntervalRateLimiter>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl AnalyticsDispatcher {
    pub fn new(
        gateway: Arc<dyn AnalyticsGateway>,
        limiter: Arc<IntervalRateLimiter>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gateway,
            limiter,
            breaker,
            retry,
            metrics,
        }
    }

    pub fn limiter(&self) -> &Arc<IntervalRateLimiter> {
        &self.limiter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Dispatches one batch.
    ///
    /// Success counters are recorded here. Failures are returned to the
    /// caller, which owns dead-letter routing.
    pub async fn dispatch(&self, batch: &Batch) -> Result<AnalyticsBatchResponse> {
        let result = timed(self.retry.run_with(
            "analytics_dispatch",
            || self.attempt(batch),
            |attempt, e| {
                warn!(batch_id = %batch.id(), attempt = attempt, error_type = %e.kind(), error = %e, "Dispatch attempt failed, retrying");
            },
        ))
        .await;

        let elapsed_ms = result.elapsed_ms();
        let response = match result.value {
            Ok(response) => response,
            Err(e) => {
                if e.kind() == ErrorKind::CircuitOpen {
                    self.metrics.circuit_rejections.inc();
                }
                return Err(e);
            }
        };

        self.metrics.batches_processed.inc();
        self.metrics
            .records_sent_to_analytics
            .inc_by(batch.len() as u64);
        self.metrics.total_batch_processing_time_ms.inc_by(elapsed_ms);

        info!(
            batch_id = %batch.id(),
            records = batch.len(),
            items_ingested = response.items_ingested,
            elapsed_ms = elapsed_ms,
            "[Timing] Batch dispatched to analytics in {} ms",
            elapsed_ms
        );
        Ok(response)
    }

    async fn attempt(&self, batch: &Batch) -> Result<AnalyticsBatchResponse> {
        let permit = self.breaker.try_acquire()?;

        // An unused permit is dropped without an outcome.
        self.limiter.acquire().await?;

        match self.gateway.send_batch(batch.records()).await {
            Ok(response) => {
                permit.record_success();
                Ok(response)
            }
            Err(e) if e.kind() == ErrorKind::Quota => {
                drop(permit);
                warn!(batch_id = %batch.id(), "Analytics quota exceeded, not retrying");
                Err(e)
            }
            Err(e) => {
                permit.record_failure();
                Err(e)
            }
        }
    }
}
