//! Pipeline workers for the log processor.
//!
//! - Enrichment (raw record → enriched record or dead letter)
//! - Aggregation (enriched records → size/time windows)
//! - Dispatch (windows → analytics backend, one per rate-limit interval)
//! - Resilience (circuit breaker, retry, rate limiter)

pub mod aggregator;
pub mod config;
pub mod dead_letter;
pub mod dispatcher;
pub mod enrichment;
pub mod resilience;
pub mod scheduler;

pub use aggregator::{BatchAggregator, DeliveryOutcome};
pub use config::{AnalyticsConfig, EnrichmentConfig, WorkerConfig};
pub use dispatcher::AnalyticsDispatcher;
pub use enrichment::{EnrichmentOutcome, EnrichmentPool, EnrichmentWorker};
pub use scheduler::{PipelineHandle, WorkerScheduler};
