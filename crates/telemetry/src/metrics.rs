//! Process-lifetime pipeline metrics.
//!
//! All counters are monotonic: increments are atomic and commutative, and
//! there is no reset. A fresh register only appears at process start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonic counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        // Saturate so an unmatched dec can never wrap to u64::MAX.
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Increments now and decrements when the guard drops, including when
    /// the owning future is cancelled.
    pub fn track(&self) -> GaugeGuard<'_> {
        self.inc();
        GaugeGuard(self)
    }
}

/// Decrements its gauge on drop.
#[derive(Debug)]
pub struct GaugeGuard<'a>(&'a Gauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Counters for the enrichment and dispatch pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingestion
    pub records_ingested: Counter,

    // Enrichment
    pub records_enriched: Counter,
    pub enrichment_failures: Counter,
    pub enrichment_retries: Counter,
    pub total_enrichment_time_ms: Counter,

    // Analytics
    pub batches_processed: Counter,
    pub records_sent_to_analytics: Counter,
    pub analytics_failures: Counter,
    pub total_batch_processing_time_ms: Counter,

    // Calls refused by either circuit breaker
    pub circuit_rejections: Counter,

    // Dead-letter sink
    pub dead_letters_published: Counter,
    pub dead_letter_publish_failures: Counter,

    // Gauges
    pub enrichments_in_flight: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub records_ingested: u64,
    pub records_enriched: u64,
    pub enrichment_failures: u64,
    pub enrichment_retries: u64,
    pub circuit_rejections: u64,
    pub total_enrichment_time_ms: u64,
    pub batches_processed: u64,
    pub records_sent_to_analytics: u64,
    pub analytics_failures: u64,
    pub total_batch_processing_time_ms: u64,
    pub dead_letters_published: u64,
    pub dead_letter_publish_failures: u64,
    pub enrichments_in_flight: u64,
    pub mean_enrichment_time_ms: f64,
    pub mean_batch_processing_time_ms: f64,
}

fn mean(total: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let records_enriched = self.records_enriched.get();
        let total_enrichment_time_ms = self.total_enrichment_time_ms.get();
        let batches_processed = self.batches_processed.get();
        let total_batch_processing_time_ms = self.total_batch_processing_time_ms.get();

        MetricsSnapshot {
            timestamp: Utc::now(),
            records_ingested: self.records_ingested.get(),
            records_enriched,
            enrichment_failures: self.enrichment_failures.get(),
            enrichment_retries: self.enrichment_retries.get(),
            circuit_rejections: self.circuit_rejections.get(),
            total_enrichment_time_ms,
            batches_processed,
            records_sent_to_analytics: self.records_sent_to_analytics.get(),
            analytics_failures: self.analytics_failures.get(),
            total_batch_processing_time_ms,
            dead_letters_published: self.dead_letters_published.get(),
            dead_letter_publish_failures: self.dead_letter_publish_failures.get(),
            enrichments_in_flight: self.enrichments_in_flight.get(),
            mean_enrichment_time_ms: mean(total_enrichment_time_ms, records_enriched),
            mean_batch_processing_time_ms: mean(total_batch_processing_time_ms, batches_processed),
        }
    }
}
