//! Common test setup functions.

use std::sync::Arc;
use std::time::Duration;

use api::{router, AppState};
use axum::Router;
use broker::{InMemoryBroker, RecordPublisher};
use processor_core::{DeadLetter, ErrorKind};
use telemetry::{Metrics, MetricsSnapshot};
use worker::resilience::RateLimiterConfig;
use worker::{PipelineHandle, WorkerConfig, WorkerScheduler};

use crate::fixtures::TEST_AUTH_TOKEN;
use crate::mocks::{MockAnalyticsGateway, MockEnrichmentGateway, MockPublisher};

/// Router over a capturing publisher, with no workers behind it.
pub struct ApiContext {
    pub publisher: Arc<MockPublisher>,
    pub metrics: Arc<Metrics>,
    pub router: Router,
}

impl ApiContext {
    pub fn new() -> Self {
        let publisher = Arc::new(MockPublisher::new());
        let metrics = Arc::new(Metrics::new());

        let state = AppState::new(publisher.clone() as Arc<dyn RecordPublisher>, metrics.clone())
            .with_auth_token(TEST_AUTH_TOKEN);

        Self {
            publisher,
            metrics,
            router: router(state),
        }
    }
}

impl Default for ApiContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker configuration with the production defaults.
pub fn default_worker_config() -> WorkerConfig {
    WorkerConfig::default()
}

/// Worker configuration with a short rate-limit interval for real-time tests.
pub fn fast_worker_config() -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.analytics.rate_limit = RateLimiterConfig {
        interval_ms: 50,
        timeout_ms: 5_000,
    };
    config.analytics.batch_wait_ms = 100;
    config.enrichment.retry.initial_backoff_ms = 10;
    config.analytics.retry.initial_backoff_ms = 10;
    config
}

/// The full pipeline over the in-memory broker and gateway doubles.
///
/// The router publishes into the same broker the workers consume, so a
/// request travels the production code path end to end.
pub struct PipelineContext {
    pub broker: Arc<InMemoryBroker>,
    pub enrichment: MockEnrichmentGateway,
    pub analytics: MockAnalyticsGateway,
    pub metrics: Arc<Metrics>,
    pub router: Router,
    pipeline: Option<PipelineHandle>,
}

impl PipelineContext {
    /// Builds and starts the pipeline. Must be called inside a runtime.
    pub fn start(config: WorkerConfig) -> Self {
        let broker = Arc::new(InMemoryBroker::new(1_000));
        let enrichment = MockEnrichmentGateway::new();
        let analytics = MockAnalyticsGateway::new();
        let metrics = Arc::new(Metrics::new());

        let raw_rx = broker
            .take_raw_receiver()
            .expect("raw receiver available");
        let enriched_rx = broker
            .take_enriched_receiver()
            .expect("enriched receiver available");

        let publisher = broker.clone() as Arc<dyn RecordPublisher>;
        let scheduler = WorkerScheduler::new(
            config,
            publisher.clone(),
            Arc::new(enrichment.clone()),
            Arc::new(analytics.clone()),
            metrics.clone(),
        );
        let pipeline = scheduler.start(raw_rx, enriched_rx);

        let state = AppState::new(publisher, metrics.clone()).with_auth_token(TEST_AUTH_TOKEN);

        Self {
            broker,
            enrichment,
            analytics,
            metrics,
            router: router(state),
            pipeline: Some(pipeline),
        }
    }

    /// Drains the pipeline the way the service does on a shutdown signal.
    pub async fn shutdown(&mut self, timeout: Duration) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown(timeout).await;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.broker.dead_letters()
    }

    pub fn dead_letters_of(&self, kind: ErrorKind) -> Vec<DeadLetter> {
        self.dead_letters()
            .into_iter()
            .filter(|l| l.is_kind(kind))
            .collect()
    }

    /// Records that reached analytics successfully or the dead-letter sink.
    pub fn settled_records(&self) -> usize {
        let s = self.snapshot();
        s.records_sent_to_analytics as usize
            + self
                .dead_letters()
                .iter()
                .map(|l| l.record_count())
                .sum::<usize>()
    }
}

impl Drop for PipelineContext {
    fn drop(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.abort();
        }
    }
}

/// Polls `condition` every 10ms until it holds or `timeout` elapses.
///
/// Under a paused clock the sleeps advance virtual time.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
