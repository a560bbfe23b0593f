//! Batch aggregation over the enriched channel.

use std::sync::Arc;

use broker::{BatchConfig, BatchWindow, RecordPublisher};
use processor_core::limits::MAX_ANALYTICS_BATCH_SIZE;
use processor_core::{Batch, DeadLetter, EnrichedRecord, Error, ErrorKind, FailedBatchMessage};
use telemetry::Metrics;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dead_letter::publish_dead_letter;
use crate::dispatcher::AnalyticsDispatcher;

/// What happened to one delivered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Dispatched,
    DeadLettered(ErrorKind),
    Lost(ErrorKind),
}

/// Single serialized consumer of enriched records.
///
/// Windows are handed to the dispatcher one at a time. A window that
/// fails dispatch is dead-lettered whole and never re-aggregated.
pub struct BatchAggregator {
    window: BatchWindow,
    dispatcher: Arc<AnalyticsDispatcher>,
    publisher: Arc<dyn RecordPublisher>,
    metrics: Arc<Metrics>,
}

impl BatchAggregator {
    pub fn new(
        config: BatchConfig,
        dispatcher: Arc<AnalyticsDispatcher>,
        publisher: Arc<dyn RecordPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let window = BatchWindow::new(BatchConfig {
            max_size: config.max_size.min(MAX_ANALYTICS_BATCH_SIZE),
            max_wait: config.max_wait,
        });
        Self {
            window,
            dispatcher,
            publisher,
            metrics,
        }
    }

    /// Consumes `rx` until it closes, flushing the last partial window.
    ///
    /// Windows still undelivered when `deadline` fires are dead-lettered
    /// with a `Shutdown` error.
    pub async fn run(&self, mut rx: mpsc::Receiver<EnrichedRecord>, deadline: CancellationToken) {
        let config = self.window.config();
        info!(
            max_size = config.max_size,
            max_wait_ms = config.max_wait.as_millis() as u64,
            "Batch aggregator starting"
        );

        while let Some(records) = self.window.next_batch(&mut rx).await {
            if deadline.is_cancelled() {
                self.abandon(records).await;
                continue;
            }

            let pending = records.clone();
            tokio::select! {
                biased;
                _ = self.deliver(records) => {}
                _ = deadline.cancelled() => {
                    self.abandon(pending).await;
                }
            }
        }

        info!("Batch aggregator stopped");
    }

    /// Dispatches one window, dead-lettering it on failure.
    pub async fn deliver(&self, records: Vec<EnrichedRecord>) -> DeliveryOutcome {
        let batch = match self.seal(records) {
            Ok(batch) => batch,
            Err(outcome) => return outcome,
        };

        info!(batch_id = %batch.id(), records = batch.len(), "Dispatching batch");

        match self.dispatcher.dispatch(&batch).await {
            Ok(_) => DeliveryOutcome::Dispatched,
            Err(e) => self.fail(batch, e).await,
        }
    }

    /// Dead-letters a window that cannot be dispatched before the drain deadline.
    pub async fn abandon(&self, records: Vec<EnrichedRecord>) -> DeliveryOutcome {
        match self.seal(records) {
            Ok(batch) => {
                self.fail(batch, Error::shutdown("drain deadline reached before dispatch"))
                    .await
            }
            Err(outcome) => outcome,
        }
    }

    fn seal(&self, records: Vec<EnrichedRecord>) -> Result<Batch, DeliveryOutcome> {
        let count = records.len();
        Batch::new(records).map_err(|e| {
            // Unreachable while the window is capped at the batch limit.
            self.metrics.analytics_failures.inc();
            error!(critical = true, records = count, error = %e, "Rejected malformed batch");
            DeliveryOutcome::Lost(e.kind())
        })
    }

    async fn fail(&self, batch: Batch, error: Error) -> DeliveryOutcome {
        self.metrics.analytics_failures.inc();
        let kind = error.kind();
        warn!(
            batch_id = %batch.id(),
            records = batch.len(),
            error_type = %kind,
            error = %error,
            "Batch not dispatched, routing to dead-letter sink"
        );

        let letter = DeadLetter::batch(FailedBatchMessage::new(batch, &error));
        if publish_dead_letter(self.publisher.as_ref(), &self.metrics, &letter).await {
            DeliveryOutcome::DeadLettered(kind)
        } else {
            DeliveryOutcome::Lost(kind)
        }
    }
}
