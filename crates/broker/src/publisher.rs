//! Publishing seam between pipeline stages and the transport.

use async_trait::async_trait;
use processor_core::{ActivityRecord, DeadLetter, EnrichedRecord, Result};

/// Sends records onto the pipeline's channels.
///
/// Implemented by the in-memory broker, the Redpanda producer, and test
/// doubles. Every failure is reported as `ErrorKind::PublishFailure`.
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    /// Enqueue a validated raw record for enrichment.
    async fn publish_raw(&self, record: &ActivityRecord) -> Result<()>;

    /// Enqueue an enriched record for aggregation.
    async fn publish_enriched(&self, record: &EnrichedRecord) -> Result<()>;

    /// Write to the dead-letter sink.
    async fn publish_dead_letter(&self, letter: &DeadLetter) -> Result<()>;

    /// Stops accepting raw records so the enrichment stage can drain.
    fn close_raw(&self) {}

    /// Stops accepting enriched records so the aggregator can flush.
    fn close_enriched(&self) {}

    /// Checks if the publisher can currently accept messages.
    fn is_healthy(&self) -> bool {
        true
    }
}
