//! Worker scheduler: builds the pipeline graph and spawns its tasks.

use std::sync::Arc;
use std::time::Duration;

use broker::{BatchConfig, Pump, RecordPublisher};
use gateway::{AnalyticsGateway, EnrichmentGateway};
use processor_core::{ActivityRecord, EnrichedRecord};
use telemetry::{health, Metrics};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::BatchAggregator;
use crate::config::WorkerConfig;
use crate::dispatcher::{is_retryable_dispatch_error, AnalyticsDispatcher};
use crate::enrichment::{is_retryable_enrichment_error, EnrichmentPool, EnrichmentWorker};
use crate::resilience::{CircuitBreaker, IntervalRateLimiter, RetryPolicy};

/// Owner of every long-lived pipeline component.
///
/// Breakers, the rate limiter and the metrics register are created once
/// here and shared with the stages through `Arc`.
pub struct WorkerScheduler {
    config: WorkerConfig,
    publisher: Arc<dyn RecordPublisher>,
    metrics: Arc<Metrics>,
    enrichment: Arc<EnrichmentWorker>,
    aggregator: Arc<BatchAggregator>,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        publisher: Arc<dyn RecordPublisher>,
        enrichment_gateway: Arc<dyn EnrichmentGateway>,
        analytics_gateway: Arc<dyn AnalyticsGateway>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let enrichment_breaker = Arc::new(
            CircuitBreaker::new("enrichment", config.enrichment.circuit_breaker.clone())
                .with_health(&health().enrichment),
        );
        let enrichment = Arc::new(EnrichmentWorker::new(
            enrichment_gateway,
            publisher.clone(),
            enrichment_breaker,
            RetryPolicy::new(config.enrichment.retry.clone(), is_retryable_enrichment_error),
            config.enrichment.call_timeout(),
            metrics.clone(),
        ));

        let analytics_breaker = Arc::new(
            CircuitBreaker::new("analytics", config.analytics.circuit_breaker.clone())
                .with_health(&health().analytics),
        );
        let limiter = Arc::new(IntervalRateLimiter::new(
            "analytics",
            config.analytics.rate_limit.clone(),
        ));
        let dispatcher = Arc::new(AnalyticsDispatcher::new(
            analytics_gateway,
            limiter,
            analytics_breaker,
            RetryPolicy::new(config.analytics.retry.clone(), is_retryable_dispatch_error),
            metrics.clone(),
        ));

        let aggregator = Arc::new(BatchAggregator::new(
            BatchConfig {
                max_size: config.analytics.batch_size,
                max_wait: config.analytics.batch_wait(),
            },
            dispatcher,
            publisher.clone(),
            metrics.clone(),
        ));

        Self {
            config,
            publisher,
            metrics,
            enrichment,
            aggregator,
        }
    }

    pub fn enrichment(&self) -> &Arc<EnrichmentWorker> {
        &self.enrichment
    }

    pub fn aggregator(&self) -> &Arc<BatchAggregator> {
        &self.aggregator
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Spawns the enrichment pool, the aggregator and the metrics log.
    pub fn start(
        &self,
        raw_rx: mpsc::Receiver<ActivityRecord>,
        enriched_rx: mpsc::Receiver<EnrichedRecord>,
    ) -> PipelineHandle {
        let deadline = CancellationToken::new();

        let pool = EnrichmentPool::new(self.enrichment.clone(), self.config.enrichment.concurrency);
        let pool = tokio::spawn(pool.run(raw_rx, deadline.clone()));
        info!("Enrichment pool started");

        let aggregator = self.aggregator.clone();
        let token = deadline.clone();
        let aggregator = tokio::spawn(async move {
            aggregator.run(enriched_rx, token).await;
        });
        info!("Batch aggregator started");

        let mut background = Vec::new();
        if let Some(period) = self.config.metrics_log_interval {
            let metrics = self.metrics.clone();
            background.push(tokio::spawn(run_metrics_log(metrics, period)));
        }

        info!("Background workers started");
        PipelineHandle {
            publisher: self.publisher.clone(),
            metrics: self.metrics.clone(),
            deadline,
            pool,
            aggregator,
            background,
            raw_intake: None,
            enriched_intake: None,
        }
    }
}

/// Extra time a stage gets after the drain deadline to dead-letter what it holds.
const ABANDON_GRACE: Duration = Duration::from_secs(5);

/// Running pipeline tasks, stopped through [`PipelineHandle::shutdown`].
pub struct PipelineHandle {
    publisher: Arc<dyn RecordPublisher>,
    metrics: Arc<Metrics>,
    deadline: CancellationToken,
    pool: JoinHandle<()>,
    aggregator: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
    raw_intake: Option<Pump>,
    enriched_intake: Option<Pump>,
}

impl PipelineHandle {
    /// Attaches the consumer pumps feeding the stage channels.
    pub fn with_intakes(mut self, raw: Pump, enriched: Pump) -> Self {
        self.raw_intake = Some(raw);
        self.enriched_intake = Some(enriched);
        self
    }

    /// Drains the pipeline stage by stage.
    ///
    /// Intake stops first. The pool settles every queued record, then the
    /// aggregator flushes its windows, including the last partial one.
    /// Whatever is still unsettled when `timeout` elapses is dead-lettered
    /// with a `Shutdown` error.
    pub async fn shutdown(self, timeout: Duration) {
        let started = Instant::now();
        info!(timeout_ms = timeout.as_millis() as u64, "Draining pipeline");

        let deadline = self.deadline.clone();
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("Drain deadline reached, dead-lettering unsettled work");
            deadline.cancel();
        });

        self.publisher.close_raw();
        if let Some(pump) = self.raw_intake {
            pump.stop().await;
        }
        join_stage("enrichment pool", self.pool, &self.deadline).await;

        self.publisher.close_enriched();
        if let Some(pump) = self.enriched_intake {
            pump.stop().await;
        }
        join_stage("batch aggregator", self.aggregator, &self.deadline).await;

        watchdog.abort();
        for handle in &self.background {
            handle.abort();
        }

        let s = self.metrics.snapshot();
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            deadline_reached = self.deadline.is_cancelled(),
            records_enriched = s.records_enriched,
            records_sent_to_analytics = s.records_sent_to_analytics,
            dead_letters_published = s.dead_letters_published,
            dead_letter_publish_failures = s.dead_letter_publish_failures,
            "Pipeline drained"
        );
    }

    /// Stops every task without draining.
    pub fn abort(&self) {
        self.deadline.cancel();
        self.pool.abort();
        self.aggregator.abort();
        for handle in &self.background {
            handle.abort();
        }
        if let Some(pump) = &self.raw_intake {
            pump.abort();
        }
        if let Some(pump) = &self.enriched_intake {
            pump.abort();
        }
    }
}

async fn join_stage(stage: &'static str, mut handle: JoinHandle<()>, deadline: &CancellationToken) {
    let overdue = async {
        deadline.cancelled().await;
        tokio::time::sleep(ABANDON_GRACE).await;
    };

    tokio::select! {
        result = &mut handle => {
            if let Err(e) = result {
                error!(critical = true, stage = stage, error = %e, "Pipeline stage failed while draining");
            }
        }
        _ = overdue => {
            handle.abort();
            error!(
                critical = true,
                stage = stage,
                "Pipeline stage did not settle after the drain deadline, records may be lost"
            );
        }
    }
}

async fn run_metrics_log(metrics: Arc<Metrics>, period: Duration) {
    let mut ticker = interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let s = metrics.snapshot();
        info!(
            records_ingested = s.records_ingested,
            records_enriched = s.records_enriched,
            enrichment_failures = s.enrichment_failures,
            batches_processed = s.batches_processed,
            records_sent_to_analytics = s.records_sent_to_analytics,
            analytics_failures = s.analytics_failures,
            dead_letters_published = s.dead_letters_published,
            dead_letter_publish_failures = s.dead_letter_publish_failures,
            mean_enrichment_time_ms = s.mean_enrichment_time_ms,
            mean_batch_processing_time_ms = s.mean_batch_processing_time_ms,
            "[Metrics] pipeline summary"
        );
    }
}
