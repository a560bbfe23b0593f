//! Terminal routing of failed work to the dead-letter sink.

use broker::RecordPublisher;
use processor_core::DeadLetter;
use telemetry::Metrics;
use tracing::{error, info};

/// Publishes `letter`, returning whether the sink accepted it.
///
/// A refused dead letter is the one accepted loss in the pipeline: it is
/// logged as critical and counted, never retried.
pub async fn publish_dead_letter(
    publisher: &dyn RecordPublisher,
    metrics: &Metrics,
    letter: &DeadLetter,
) -> bool {
    match publisher.publish_dead_letter(letter).await {
        Ok(()) => {
            metrics.dead_letters_published.inc();
            info!(
                dead_letter_id = %letter.id,
                error_type = letter.error_type(),
                records = letter.record_count(),
                "Published to dead-letter sink"
            );
            true
        }
        Err(e) => {
            metrics.dead_letter_publish_failures.inc();
            error!(
                critical = true,
                dead_letter_id = %letter.id,
                error_type = letter.error_type(),
                records = letter.record_count(),
                error = %e,
                "Failed to publish to dead-letter sink, records lost"
            );
            false
        }
    }
}
