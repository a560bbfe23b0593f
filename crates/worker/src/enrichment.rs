//! Enrichment stage.
//!
//! Turns each raw record into exactly one of: an enriched record on the
//! enriched channel, or a dead letter carrying the original record.

use std::sync::Arc;
use std::time::Duration;

use broker::RecordPublisher;
use gateway::EnrichmentGateway;
use processor_core::{
    ActivityRecord, DeadLetter, EnrichedRecord, EnrichmentRequest, EnrichmentResponse, Error,
    ErrorKind, FailedRecordMessage, Result,
};
use telemetry::{track_execution_time, Metrics};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dead_letter::publish_dead_letter;
use crate::resilience::{CircuitBreaker, RetryPolicy};

/// Enrichment retries only cover timeouts, 5xx and network failures.
pub fn is_retryable_enrichment_error(error: &Error) -> bool {
    error.is_transient()
}

/// Where a processed record ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// Published to the enriched channel
    Enriched(EnrichedRecord),
    /// Original record written to the dead-letter sink
    DeadLettered(ErrorKind),
    /// The dead-letter sink refused the record as well
    Lost(ErrorKind),
}

/// Enriches one record at a time through a breaker-guarded, retried call.
pub struct EnrichmentWorker {
    gateway: Arc<dyn EnrichmentGateway>,
    publisher: Arc<dyn RecordPublisher>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    call_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl EnrichmentWorker {
    pub fn new(
        gateway: Arc<dyn EnrichmentGateway>,
        publisher: Arc<dyn RecordPublisher>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        call_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            gateway,
            publisher,
            breaker,
            retry,
            call_timeout,
            metrics,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Looks up `record` and builds its enriched form.
    ///
    /// Each attempt asks the breaker first; a rejection ends the retry
    /// loop immediately.
    pub async fn enrich(&self, record: &ActivityRecord) -> Result<EnrichedRecord> {
        let request = record.enrichment_request();
        let metrics = &self.metrics;

        let response = self
            .retry
            .run_with(
                "enrichment",
                || self.attempt(&request),
                |attempt, e| {
                    metrics.enrichment_retries.inc();
                    warn!(record_id = record.id, attempt = attempt, error = %e, "Enrichment attempt failed, retrying");
                },
            )
            .await?;

        Ok(record.enrich(response))
    }

    async fn attempt(&self, request: &EnrichmentRequest) -> Result<EnrichmentResponse> {
        let permit = self.breaker.try_acquire()?;

        match tokio::time::timeout(self.call_timeout, self.gateway.enrich(request)).await {
            Ok(Ok(response)) => {
                permit.record_success();
                Ok(response)
            }
            Ok(Err(e)) => {
                permit.record_failure();
                Err(e)
            }
            Err(_) => {
                permit.record_failure();
                Err(Error::transient(format!(
                    "enrichment call timed out after {} ms",
                    self.call_timeout.as_millis()
                )))
            }
        }
    }

    /// Processes one record end to end. Never fails.
    pub async fn process(&self, record: ActivityRecord) -> EnrichmentOutcome {
        let _in_flight = self.metrics.enrichments_in_flight.track();
        let result = track_execution_time(
            "enrichment",
            &self.metrics.total_enrichment_time_ms,
            self.enrich(&record),
        )
        .await;

        match result {
            Ok(enriched) => match self.publisher.publish_enriched(&enriched).await {
                Ok(()) => {
                    self.metrics.records_enriched.inc();
                    debug!(record_id = enriched.id, "Record enriched");
                    EnrichmentOutcome::Enriched(enriched)
                }
                Err(e) => {
                    warn!(record_id = record.id, error = %e, "Failed to publish enriched record");
                    self.fail(record, Error::publish_failure(e.to_string())).await
                }
            },
            Err(e) => {
                if e.kind() == ErrorKind::CircuitOpen {
                    self.metrics.circuit_rejections.inc();
                }
                warn!(record_id = record.id, error_type = %e.kind(), error = %e, "Enrichment failed");
                self.fail(record, e).await
            }
        }
    }

    /// Dead-letters a record that cannot settle before the drain deadline.
    pub async fn abandon(&self, record: ActivityRecord) -> EnrichmentOutcome {
        warn!(record_id = record.id, "Drain deadline reached, dead-lettering record");
        self.fail(
            record,
            Error::shutdown("drain deadline reached before enrichment completed"),
        )
        .await
    }

    async fn fail(&self, record: ActivityRecord, error: Error) -> EnrichmentOutcome {
        self.metrics.enrichment_failures.inc();
        let kind = error.kind();
        let letter = DeadLetter::record(FailedRecordMessage::new(record, &error));

        if publish_dead_letter(self.publisher.as_ref(), &self.metrics, &letter).await {
            EnrichmentOutcome::DeadLettered(kind)
        } else {
            EnrichmentOutcome::Lost(kind)
        }
    }
}

/// Runs up to `concurrency` enrichments at once off the raw channel.
pub struct EnrichmentPool {
    worker: Arc<EnrichmentWorker>,
    concurrency: usize,
}

impl EnrichmentPool {
    pub fn new(worker: Arc<EnrichmentWorker>, concurrency: usize) -> Self {
        Self {
            worker,
            concurrency: concurrency.max(1),
        }
    }

    /// Consumes `rx` until it closes, then waits for in-flight records.
    ///
    /// Once `deadline` fires, queued and in-flight records are
    /// dead-lettered with a `Shutdown` error instead of being enriched.
    pub async fn run(self, mut rx: mpsc::Receiver<ActivityRecord>, deadline: CancellationToken) {
        info!(concurrency = self.concurrency, "Enrichment pool starting");
        let slots = Arc::new(Semaphore::new(self.concurrency));

        loop {
            let record = tokio::select! {
                biased;
                _ = deadline.cancelled() => break,
                record = rx.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };

            let slot = tokio::select! {
                biased;
                _ = deadline.cancelled() => {
                    self.worker.abandon(record).await;
                    break;
                }
                slot = slots.clone().acquire_owned() => match slot {
                    Ok(slot) => slot,
                    Err(_) => {
                        self.worker.abandon(record).await;
                        break;
                    }
                },
            };

            let worker = self.worker.clone();
            let deadline = deadline.clone();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = worker.process(record.clone()) => {}
                    _ = deadline.cancelled() => {
                        worker.abandon(record).await;
                    }
                }
                drop(slot);
            });
        }

        if deadline.is_cancelled() {
            rx.close();
            let mut abandoned = 0u64;
            while let Ok(record) = rx.try_recv() {
                self.worker.abandon(record).await;
                abandoned += 1;
            }
            if abandoned > 0 {
                warn!(records = abandoned, "Dead-lettered queued records at drain deadline");
            }
        }

        // Every slot free means every spawned record has finished.
        let _ = slots.acquire_many(self.concurrency as u32).await;
        info!("Enrichment pool drained");
    }
}
