//! End-to-end pipeline tests over the in-memory broker.
//!
//! Time-sensitive tests run on a paused clock so the 1s batch window and
//! the 10s dispatch interval are exercised at their production values.

use std::collections::BTreeSet;
use std::time::Duration;

use axum_test::TestServer;
use broker::RecordPublisher;
use integration_tests::fixtures::{self, TEST_AUTH_TOKEN};
use integration_tests::setup::{
    default_worker_config, fast_worker_config, wait_until, PipelineContext,
};
use processor_core::{DeadLetterPayload, ErrorKind};

async fn publish_all(ctx: &PipelineContext, n: usize) {
    for record in fixtures::activity_records(n) {
        ctx.broker.publish_raw(&record).await.expect("raw publish");
    }
}

/// 25 records leave as a full batch of 20, then 5 after the interval
#[tokio::test(start_paused = true)]
async fn test_records_dispatch_as_full_then_partial_batch() {
    let ctx = PipelineContext::start(default_worker_config());
    publish_all(&ctx, 25).await;

    assert!(
        wait_until(Duration::from_secs(30), || ctx.analytics.call_count() == 2).await,
        "Expected two analytics calls"
    );

    let received = ctx.analytics.received();
    assert_eq!(ctx.analytics.batch_sizes(), vec![20, 5]);
    assert!(
        received[1].at - received[0].at >= Duration::from_secs(10),
        "Dispatches must be at least one interval apart"
    );

    let ids: BTreeSet<i64> = received
        .iter()
        .flat_map(|b| b.records.iter().map(|r| r.id))
        .collect();
    assert_eq!(ids, (0..25).collect::<BTreeSet<_>>());

    let s = ctx.snapshot();
    assert_eq!(s.records_enriched, 25);
    assert_eq!(s.batches_processed, 2);
    assert_eq!(s.records_sent_to_analytics, 25);
    assert_eq!(s.analytics_failures, 0);
    assert!(ctx.dead_letters().is_empty());
}

/// Each record ends up in exactly one place
#[tokio::test(start_paused = true)]
async fn test_every_record_settles_exactly_once() {
    let ctx = PipelineContext::start(default_worker_config());
    ctx.enrichment.fail_record(3, ErrorKind::ClientError);
    ctx.enrichment.fail_record(7, ErrorKind::ClientError);

    publish_all(&ctx, 12).await;

    assert!(
        wait_until(Duration::from_secs(30), || ctx.settled_records() == 12).await,
        "All records should settle"
    );

    let dead = ctx.dead_letters_of(ErrorKind::ClientError);
    let mut dead_ids: Vec<i64> = dead
        .iter()
        .filter_map(|l| match &l.payload {
            DeadLetterPayload::Enrichment(m) => Some(m.record.id),
            DeadLetterPayload::Dispatch(_) => None,
        })
        .collect();
    dead_ids.sort();
    assert_eq!(dead_ids, vec![3, 7]);

    // Client errors are never retried.
    assert_eq!(ctx.enrichment.calls_for(3), 1);
    assert_eq!(ctx.enrichment.calls_for(7), 1);

    let sent: BTreeSet<i64> = ctx
        .analytics
        .received()
        .iter()
        .flat_map(|b| b.records.iter().map(|r| r.id))
        .collect();
    assert_eq!(sent.len(), 10);
    assert!(!sent.contains(&3) && !sent.contains(&7));

    let s = ctx.snapshot();
    assert_eq!(s.records_enriched, 10);
    assert_eq!(s.enrichment_failures, 2);
    assert_eq!(s.dead_letters_published, 2);
}

/// Enriched records carry the lookup fields and keep their identity
#[tokio::test(start_paused = true)]
async fn test_enriched_fields_reach_analytics() {
    let ctx = PipelineContext::start(default_worker_config());
    publish_all(&ctx, 1).await;

    assert!(wait_until(Duration::from_secs(5), || ctx.analytics.call_count() == 1).await);

    let record = &ctx.analytics.received()[0].records[0];
    assert_eq!(record, &fixtures::enriched_record(0));
}

/// A request travels from the HTTP endpoint to the analytics backend
#[tokio::test]
async fn test_ingest_through_http_reaches_analytics() {
    let ctx = PipelineContext::start(fast_worker_config());
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/private/v1/ingest")
        .content_type("application/json")
        .add_header("Authorization", TEST_AUTH_TOKEN)
        .bytes(fixtures::ingest_body(&fixtures::activity_records(5)).to_string().into())
        .await;
    response.assert_status_ok();

    assert!(
        wait_until(Duration::from_secs(5), || {
            ctx.snapshot().records_sent_to_analytics == 5
        })
        .await,
        "All five records should reach analytics"
    );

    let body: serde_json::Value = server.get("/metrics").await.json();
    assert_eq!(body["recordsIngested"], 5);
    assert_eq!(body["recordsEnriched"], 5);
    assert_eq!(body["recordsSentToAnalytics"], 5);
}
