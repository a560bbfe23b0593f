//! Tests for the ingest endpoint.
//!
//! Uses the real router over a capturing publisher, so every assertion is
//! about what the handler accepted and published.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::fixtures::{self, TEST_AUTH_TOKEN};
use integration_tests::setup::ApiContext;

/// Valid records are published in order and counted
#[tokio::test]
async fn test_ingest_valid_records() {
    let ctx = ApiContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let records = fixtures::activity_records(3);
    let response = server
        .post("/private/v1/ingest")
        .content_type("application/json")
        .add_header("Authorization", TEST_AUTH_TOKEN)
        .bytes(fixtures::ingest_body(&records).to_string().into())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["recordsIngested"], 3);
    assert_eq!(body["message"], "Records Ingested to raw queue");

    let captured = ctx.publisher.captured_raw();
    assert_eq!(captured, records, "Records should be published unchanged, in order");
    assert_eq!(ctx.metrics.records_ingested.get(), 3);
}

/// Missing Authorization header returns 401 and publishes nothing
#[tokio::test]
async fn test_ingest_missing_auth() {
    let ctx = ApiContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/private/v1/ingest")
        .content_type("application/json")
        .bytes(fixtures::ingest_body(&fixtures::activity_records(1)).to_string().into())
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], 401);
    assert_eq!(ctx.publisher.raw_count(), 0);
    assert_eq!(ctx.metrics.records_ingested.get(), 0);
}

/// A header that does not match the configured token returns 401
#[tokio::test]
async fn test_ingest_wrong_auth() {
    let ctx = ApiContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/private/v1/ingest")
        .content_type("application/json")
        .add_header("Authorization", "Bearer someone-else")
        .bytes(fixtures::ingest_body(&fixtures::activity_records(1)).to_string().into())
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.publisher.raw_count(), 0);
}

/// One invalid record rejects the whole request with per-field details
#[tokio::test]
async fn test_ingest_validation_errors() {
    let ctx = ApiContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let body = fixtures::raw_ingest_body(vec![
        serde_json::json!({ "id": 1, "asset": "laptop-1", "ip": "10.0.0.1", "category": "phishing" }),
        serde_json::json!({ "id": 2, "asset": "", "ip": "999.0.0.1", "category": "server" }),
    ]);

    let response = server
        .post("/private/v1/ingest")
        .content_type("application/json")
        .add_header("Authorization", TEST_AUTH_TOKEN)
        .bytes(body.to_string().into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], 400);

    let errors = body["errors"].as_object().expect("errors map present");
    assert!(errors.contains_key("activityRecordList[1].asset"));
    assert!(errors.contains_key("activityRecordList[1].ip"));
    assert!(errors.contains_key("activityRecordList[1].category"));
    assert!(
        !errors.keys().any(|k| k.starts_with("activityRecordList[0]")),
        "Valid record should not be reported"
    );

    assert_eq!(ctx.publisher.raw_count(), 0, "Nothing is published on rejection");
    assert_eq!(ctx.metrics.records_ingested.get(), 0);
}

/// An empty list is a validation error
#[tokio::test]
async fn test_ingest_empty_list() {
    let ctx = ApiContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/private/v1/ingest")
        .content_type("application/json")
        .add_header("Authorization", TEST_AUTH_TOKEN)
        .bytes(fixtures::raw_ingest_body(vec![]).to_string().into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert!(body["errors"]["activityRecordList"].is_string());
}

/// Malformed JSON returns 400
#[tokio::test]
async fn test_ingest_malformed_body() {
    let ctx = ApiContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/private/v1/ingest")
        .content_type("application/json")
        .add_header("Authorization", TEST_AUTH_TOKEN)
        .bytes("{\"activityRecordList\": [".into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(ctx.publisher.raw_count(), 0);
}

/// Publish failures are skipped and excluded from the count
#[tokio::test]
async fn test_ingest_counts_only_published_records() {
    let ctx = ApiContext::new();
    ctx.publisher.fail_record(1);
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/private/v1/ingest")
        .content_type("application/json")
        .add_header("Authorization", TEST_AUTH_TOKEN)
        .bytes(fixtures::ingest_body(&fixtures::activity_records(3)).to_string().into())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["recordsIngested"], 2);

    let ids: Vec<i64> = ctx.publisher.captured_raw().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![0, 2]);
    assert_eq!(ctx.metrics.records_ingested.get(), 2);
}

/// /metrics reflects accepted records
#[tokio::test]
async fn test_metrics_endpoint_after_ingest() {
    let ctx = ApiContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    server
        .post("/private/v1/ingest")
        .content_type("application/json")
        .add_header("Authorization", TEST_AUTH_TOKEN)
        .bytes(fixtures::ingest_body(&fixtures::activity_records(4)).to_string().into())
        .await
        .assert_status_ok();

    let response = server.get("/metrics").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["recordsIngested"], 4);
    assert_eq!(body["batchesProcessed"], 0);
    assert_eq!(body["analyticsFailures"], 0);
}
