//! Enrichment failure handling: retries, the circuit breaker and
//! dead-letter routing.

use std::time::Duration;

use broker::RecordPublisher;
use integration_tests::fixtures;
use integration_tests::setup::{default_worker_config, wait_until, PipelineContext};
use processor_core::{DeadLetterPayload, ErrorKind};
use worker::WorkerConfig;

/// One attempt per record and sequential processing, so breaker
/// transitions line up with record ids.
fn sequential_config() -> WorkerConfig {
    let mut config = default_worker_config();
    config.enrichment.concurrency = 1;
    config.enrichment.retry.max_attempts = 1;
    config
}

/// Transient failures are retried, then the original record is dead-lettered
#[tokio::test(start_paused = true)]
async fn test_transient_failure_exhausts_retries() {
    let ctx = PipelineContext::start(default_worker_config());
    ctx.enrichment.set_failure(Some(ErrorKind::Transient));

    let record = fixtures::activity_record(42);
    ctx.broker.publish_raw(&record).await.unwrap();

    assert!(wait_until(Duration::from_secs(10), || ctx.dead_letters().len() == 1).await);

    assert_eq!(ctx.enrichment.calls_for(42), 3);

    let letter = &ctx.dead_letters()[0];
    assert!(letter.is_kind(ErrorKind::Transient));
    match &letter.payload {
        DeadLetterPayload::Enrichment(m) => assert_eq!(m.record, record),
        other => panic!("Expected an enrichment dead letter, got {:?}", other),
    }

    let s = ctx.snapshot();
    assert_eq!(s.enrichment_retries, 2);
    assert_eq!(s.enrichment_failures, 1);
    assert_eq!(s.records_enriched, 0);
    assert_eq!(ctx.analytics.call_count(), 0);
}

/// A transient failure followed by success enriches normally
#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers() {
    let ctx = PipelineContext::start(default_worker_config());
    ctx.enrichment.set_failure(Some(ErrorKind::Transient));

    ctx.broker
        .publish_raw(&fixtures::activity_record(1))
        .await
        .unwrap();

    // Let the first attempt fail, then heal before the first backoff ends.
    assert!(wait_until(Duration::from_millis(400), || ctx.enrichment.call_count() == 1).await);
    ctx.enrichment.set_failure(None);

    assert!(wait_until(Duration::from_secs(5), || ctx.snapshot().records_enriched == 1).await);
    assert_eq!(ctx.enrichment.calls_for(1), 2);
    assert_eq!(ctx.snapshot().enrichment_retries, 1);
    assert!(ctx.dead_letters().is_empty());
}

/// Five failures open the breaker; the sixth record is rejected unseen
#[tokio::test(start_paused = true)]
async fn test_breaker_opens_and_recovers() {
    let ctx = PipelineContext::start(sequential_config());
    ctx.enrichment.set_failure(Some(ErrorKind::Transient));

    for id in 0..6 {
        ctx.broker
            .publish_raw(&fixtures::activity_record(id))
            .await
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || ctx.dead_letters().len() == 6).await);

    assert_eq!(ctx.enrichment.call_count(), 5, "Open breaker must not call upstream");
    assert_eq!(ctx.dead_letters_of(ErrorKind::Transient).len(), 5);
    assert_eq!(ctx.dead_letters_of(ErrorKind::CircuitOpen).len(), 1);
    assert_eq!(ctx.snapshot().circuit_rejections, 1);

    // After the open wait a successful trial closes the breaker again.
    ctx.enrichment.set_failure(None);
    tokio::time::sleep(Duration::from_secs(30)).await;

    for id in 6..8 {
        ctx.broker
            .publish_raw(&fixtures::activity_record(id))
            .await
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || ctx.snapshot().records_enriched == 2).await);
    assert_eq!(ctx.enrichment.call_count(), 7);
}
