//! Record types flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Error, ErrorKind, Result};
use crate::limits::MAX_ANALYTICS_BATCH_SIZE;
use crate::validation::{validate_category, validate_ip_or_host};

/// A raw activity record as accepted at the ingestion boundary.
///
/// Validated once on ingest and never re-validated downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ActivityRecord {
    pub id: i64,
    #[validate(length(min = 1, message = "Asset name is required"))]
    pub asset: String,
    #[validate(custom(function = "validate_ip_or_host"))]
    pub ip: String,
    #[validate(custom(function = "validate_category"))]
    pub category: String,
}

impl ActivityRecord {
    pub fn new(
        id: i64,
        asset: impl Into<String>,
        ip: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id,
            asset: asset.into(),
            ip: ip.into(),
            category: category.into(),
        }
    }

    /// Builds the lookup request for the enrichment service.
    pub fn enrichment_request(&self) -> EnrichmentRequest {
        EnrichmentRequest {
            id: self.id,
            asset: self.asset.clone(),
            ip: self.ip.clone(),
            category: self.category.clone(),
        }
    }

    /// Combines this record with a lookup response.
    ///
    /// `id`, `asset` and `ip` are copied verbatim; everything else comes
    /// from the response.
    pub fn enrich(&self, response: EnrichmentResponse) -> EnrichedRecord {
        EnrichedRecord {
            id: self.id,
            asset: self.asset.clone(),
            ip: self.ip.clone(),
            category: response.category,
            asn: response.asn,
            correlation_id: response.correlation_id,
        }
    }
}

/// Request body for the enrichment service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    pub id: i64,
    pub asset: String,
    pub ip: String,
    pub category: String,
}

/// Response body from the enrichment service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResponse {
    pub category: String,
    pub asn: String,
    pub correlation_id: i64,
}

/// A record after a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub id: i64,
    pub asset: String,
    pub ip: String,
    pub category: String,
    pub asn: String,
    pub correlation_id: i64,
}

/// Response body from the analytics backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsBatchResponse {
    pub status: String,
    #[serde(default)]
    pub items_ingested: u64,
}

/// An ordered window of enriched records dispatched as one unit.
#[derive(Debug, Clone)]
pub struct Batch {
    id: Uuid,
    records: Vec<EnrichedRecord>,
    created_at: DateTime<Utc>,
}

impl Batch {
    /// Creates a batch, rejecting empty or oversized windows.
    pub fn new(records: Vec<EnrichedRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::validation("batch must contain at least one record"));
        }
        if records.len() > MAX_ANALYTICS_BATCH_SIZE {
            return Err(Error::validation(format!(
                "batch has {} records, exceeds {} limit",
                records.len(),
                MAX_ANALYTICS_BATCH_SIZE
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            records,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn records(&self) -> &[EnrichedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn into_records(self) -> Vec<EnrichedRecord> {
        self.records
    }
}

/// A raw record that could not be enriched or published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecordMessage {
    pub record: ActivityRecord,
    pub error_type: String,
    pub error_message: String,
}

impl FailedRecordMessage {
    pub fn new(record: ActivityRecord, error: &Error) -> Self {
        Self {
            record,
            error_type: error.kind().as_str().to_string(),
            error_message: error.to_string(),
        }
    }
}

/// A whole batch that failed at dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedBatchMessage {
    pub batch_id: Uuid,
    pub records: Vec<EnrichedRecord>,
    pub error_type: String,
    pub error_message: String,
}

impl FailedBatchMessage {
    pub fn new(batch: Batch, error: &Error) -> Self {
        Self {
            batch_id: batch.id(),
            records: batch.into_records(),
            error_type: error.kind().as_str().to_string(),
            error_message: error.to_string(),
        }
    }
}

/// Payload carried by a dead letter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum DeadLetterPayload {
    Enrichment(FailedRecordMessage),
    Dispatch(FailedBatchMessage),
}

/// Envelope written to the dead-letter sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    pub failed_at: DateTime<Utc>,
    pub payload: DeadLetterPayload,
}

impl DeadLetter {
    pub fn record(message: FailedRecordMessage) -> Self {
        Self::wrap(DeadLetterPayload::Enrichment(message))
    }

    pub fn batch(message: FailedBatchMessage) -> Self {
        Self::wrap(DeadLetterPayload::Dispatch(message))
    }

    fn wrap(payload: DeadLetterPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            failed_at: Utc::now(),
            payload,
        }
    }

    /// The `errorType` of the wrapped failure.
    pub fn error_type(&self) -> &str {
        match &self.payload {
            DeadLetterPayload::Enrichment(m) => &m.error_type,
            DeadLetterPayload::Dispatch(m) => &m.error_type,
        }
    }

    /// Number of records carried by this dead letter.
    pub fn record_count(&self) -> usize {
        match &self.payload {
            DeadLetterPayload::Enrichment(_) => 1,
            DeadLetterPayload::Dispatch(m) => m.records.len(),
        }
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.error_type() == kind.as_str()
    }
}
