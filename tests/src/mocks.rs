//! Mock implementations for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use broker::RecordPublisher;
use gateway::{AnalyticsGateway, EnrichmentGateway};
use parking_lot::Mutex;
use processor_core::{
    ActivityRecord, AnalyticsBatchResponse, DeadLetter, EnrichedRecord, EnrichmentRequest,
    EnrichmentResponse, Error, ErrorKind, Result,
};
use tokio::time::Instant;

/// Builds the error a real gateway would return for `kind`.
pub fn error_of(kind: ErrorKind) -> Error {
    match kind {
        ErrorKind::Transient => Error::transient("mock upstream unavailable"),
        ErrorKind::Quota => Error::quota_exceeded("mock rate limit"),
        ErrorKind::ClientError => Error::client_error(400, "mock bad request"),
        _ => Error::internal("mock failure"),
    }
}

/// Enrichment service double.
///
/// Succeeds by default; failures can be set globally or per record id.
#[derive(Clone, Default)]
pub struct MockEnrichmentGateway {
    calls: Arc<Mutex<Vec<i64>>>,
    fail_all: Arc<Mutex<Option<ErrorKind>>>,
    fail_ids: Arc<Mutex<HashMap<i64, ErrorKind>>>,
    delay: Arc<Mutex<Duration>>,
}

impl MockEnrichmentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call with `kind`, or succeed again with `None`.
    pub fn set_failure(&self, kind: Option<ErrorKind>) {
        *self.fail_all.lock() = kind;
    }

    /// Fail every call for `id` with `kind`.
    pub fn fail_record(&self, id: i64, kind: ErrorKind) {
        self.fail_ids.lock().insert(id, kind);
    }

    /// Hold every call for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Record ids in call order, one entry per attempt.
    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, id: i64) -> usize {
        self.calls.lock().iter().filter(|&&c| c == id).count()
    }
}

#[async_trait]
impl EnrichmentGateway for MockEnrichmentGateway {
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichmentResponse> {
        self.calls.lock().push(request.id);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = (*self.fail_all.lock()).or_else(|| self.fail_ids.lock().get(&request.id).copied());
        if let Some(kind) = failure {
            return Err(error_of(kind));
        }

        Ok(EnrichmentResponse {
            category: request.category.clone(),
            asn: "AS64500".to_string(),
            correlation_id: 10_000 + request.id,
        })
    }
}

/// One batch received by the analytics double.
#[derive(Debug, Clone)]
pub struct ReceivedBatch {
    pub records: Vec<EnrichedRecord>,
    pub at: Instant,
}

/// Analytics backend double that captures every call.
#[derive(Clone, Default)]
pub struct MockAnalyticsGateway {
    received: Arc<Mutex<Vec<ReceivedBatch>>>,
    failure: Arc<Mutex<Option<ErrorKind>>>,
}

impl MockAnalyticsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call with `kind`, or succeed again with `None`.
    pub fn set_failure(&self, kind: Option<ErrorKind>) {
        *self.failure.lock() = kind;
    }

    /// Every call, including failed ones.
    pub fn received(&self) -> Vec<ReceivedBatch> {
        self.received.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.received.lock().iter().map(|b| b.records.len()).collect()
    }
}

#[async_trait]
impl AnalyticsGateway for MockAnalyticsGateway {
    async fn send_batch(&self, records: &[EnrichedRecord]) -> Result<AnalyticsBatchResponse> {
        self.received.lock().push(ReceivedBatch {
            records: records.to_vec(),
            at: Instant::now(),
        });

        if let Some(kind) = *self.failure.lock() {
            return Err(error_of(kind));
        }

        Ok(AnalyticsBatchResponse {
            status: "ok".to_string(),
            items_ingested: records.len() as u64,
        })
    }
}

/// Publisher double that captures raw publishes.
///
/// Lets API tests observe exactly what the handler published, and
/// simulate a broker that refuses messages.
#[derive(Clone, Default)]
pub struct MockPublisher {
    raw: Arc<Mutex<Vec<ActivityRecord>>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    should_fail: Arc<Mutex<bool>>,
    fail_ids: Arc<Mutex<Vec<i64>>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured_raw(&self) -> Vec<ActivityRecord> {
        self.raw.lock().clone()
    }

    pub fn raw_count(&self) -> usize {
        self.raw.lock().len()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().clone()
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    /// Refuse raw publishes of `id` only.
    pub fn fail_record(&self, id: i64) {
        self.fail_ids.lock().push(id);
    }
}

#[async_trait]
impl RecordPublisher for MockPublisher {
    async fn publish_raw(&self, record: &ActivityRecord) -> Result<()> {
        if *self.should_fail.lock() || self.fail_ids.lock().contains(&record.id) {
            return Err(Error::publish_failure("mock publisher failure"));
        }
        self.raw.lock().push(record.clone());
        Ok(())
    }

    async fn publish_enriched(&self, _record: &EnrichedRecord) -> Result<()> {
        if *self.should_fail.lock() {
            return Err(Error::publish_failure("mock publisher failure"));
        }
        Ok(())
    }

    async fn publish_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        if *self.should_fail.lock() {
            return Err(Error::publish_failure("mock publisher failure"));
        }
        self.dead_letters.lock().push(letter.clone());
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !*self.should_fail.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_enrichment_per_record_failure() {
        let mock = MockEnrichmentGateway::new();
        mock.fail_record(2, ErrorKind::ClientError);

        let ok = mock
            .enrich(&EnrichmentRequest {
                id: 1,
                asset: "a".into(),
                ip: "1.1.1.1".into(),
                category: "phishing".into(),
            })
            .await
            .unwrap();
        assert_eq!(ok.correlation_id, 10_001);

        let err = mock
            .enrich(&EnrichmentRequest {
                id: 2,
                asset: "b".into(),
                ip: "1.1.1.1".into(),
                category: "phishing".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientError);
        assert_eq!(mock.calls(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_mock_publisher_failure_mode() {
        let mock = MockPublisher::new();
        mock.set_should_fail(true);

        let result = mock
            .publish_raw(&ActivityRecord::new(1, "a", "1.1.1.1", "phishing"))
            .await;
        assert!(result.is_err());
        assert!(!mock.is_healthy());
        assert_eq!(mock.raw_count(), 0);
    }
}
