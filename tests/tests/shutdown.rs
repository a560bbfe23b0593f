//! Draining the pipeline on shutdown.
//!
//! Every record accepted before shutdown must end up in analytics or the
//! dead-letter sink, whether the drain finishes or hits its deadline.

use std::collections::BTreeSet;
use std::time::Duration;

use broker::RecordPublisher;
use integration_tests::fixtures;
use integration_tests::setup::{default_worker_config, wait_until, PipelineContext};
use processor_core::{DeadLetterPayload, ErrorKind};

async fn publish_all(ctx: &PipelineContext, n: usize) {
    for record in fixtures::activity_records(n) {
        ctx.broker.publish_raw(&record).await.expect("raw publish");
    }
}

/// Ids of every record carried by `Shutdown` dead letters.
fn shutdown_ids(ctx: &PipelineContext) -> Vec<i64> {
    ctx.dead_letters_of(ErrorKind::Shutdown)
        .iter()
        .flat_map(|letter| match &letter.payload {
            DeadLetterPayload::Enrichment(message) => vec![message.record.id],
            DeadLetterPayload::Dispatch(message) => message.records.iter().map(|r| r.id).collect(),
        })
        .collect()
}

/// With room before the deadline, queued windows are still dispatched
#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_every_window_within_deadline() {
    let mut ctx = PipelineContext::start(default_worker_config());
    publish_all(&ctx, 45).await;

    assert!(
        wait_until(Duration::from_secs(5), || {
            ctx.snapshot().records_enriched == 45 && ctx.analytics.call_count() >= 1
        })
        .await,
        "Expected enrichment to finish and the first batch to leave"
    );

    ctx.shutdown(Duration::from_secs(30)).await;

    assert_eq!(ctx.analytics.batch_sizes(), vec![20, 20, 5]);
    assert!(ctx.dead_letters().is_empty());

    let s = ctx.snapshot();
    assert_eq!(s.records_sent_to_analytics, 45);
    assert_eq!(s.batches_processed, 3);
    assert_eq!(ctx.settled_records(), 45);
}

/// Windows still waiting on the rate limiter at the deadline are dead-lettered
#[tokio::test(start_paused = true)]
async fn test_shutdown_deadline_dead_letters_pending_windows() {
    let mut ctx = PipelineContext::start(default_worker_config());
    publish_all(&ctx, 45).await;

    assert!(
        wait_until(Duration::from_secs(5), || {
            ctx.snapshot().records_enriched == 45 && ctx.analytics.call_count() >= 1
        })
        .await,
        "Expected enrichment to finish and the first batch to leave"
    );

    // The next dispatch slot is 10s out, well past a 2s drain.
    ctx.shutdown(Duration::from_secs(2)).await;

    assert_eq!(ctx.analytics.batch_sizes(), vec![20]);

    let abandoned = shutdown_ids(&ctx);
    assert_eq!(abandoned.len(), 25);
    let sent: BTreeSet<i64> = ctx.analytics.received()[0]
        .records
        .iter()
        .map(|r| r.id)
        .collect();
    let mut all: BTreeSet<i64> = abandoned.into_iter().collect();
    all.extend(sent);
    assert_eq!(all, (0..45).collect::<BTreeSet<_>>());

    assert_eq!(ctx.snapshot().analytics_failures, 2);
    assert_eq!(ctx.settled_records(), 45);
}

/// Records held by slow enrichment calls are dead-lettered, not dropped
#[tokio::test(start_paused = true)]
async fn test_shutdown_deadline_dead_letters_in_flight_records() {
    let mut ctx = PipelineContext::start(default_worker_config());
    ctx.enrichment.set_delay(Duration::from_secs(60));
    publish_all(&ctx, 10).await;

    assert!(
        wait_until(Duration::from_secs(1), || ctx.enrichment.call_count() >= 1).await,
        "Expected enrichment calls to start"
    );

    ctx.shutdown(Duration::from_secs(1)).await;

    let mut ids = shutdown_ids(&ctx);
    ids.sort();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());

    let s = ctx.snapshot();
    assert_eq!(s.records_enriched, 0);
    assert_eq!(s.enrichment_failures, 10);
    assert_eq!(s.enrichments_in_flight, 0);
    assert_eq!(ctx.settled_records(), 10);
}

/// Intake is closed once shutdown starts
#[tokio::test(start_paused = true)]
async fn test_publish_after_shutdown_is_refused() {
    let mut ctx = PipelineContext::start(default_worker_config());

    ctx.shutdown(Duration::from_secs(1)).await;

    let result = ctx.broker.publish_raw(&fixtures::activity_record(1)).await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::PublishFailure);
    assert!(!ctx.broker.is_healthy());
}
