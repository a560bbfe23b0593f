//! Ingestion endpoint handler.
//!
//! Validates a list of activity records and publishes each one to the raw
//! channel for enrichment.

use axum::{body::Bytes, extract::State, Json};
use processor_core::{validation::validate_records, ActivityRecord};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::extractors::Authorized;
use crate::response::{ApiError, IngestResponse};
use crate::state::AppState;

/// Request body for `POST /private/v1/ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub activity_record_list: Vec<ActivityRecord>,
}

/// POST /private/v1/ingest
///
/// Rejects the whole request if any record is invalid. Otherwise publishes
/// records one by one; `recordsIngested` counts the successful publishes.
pub async fn ingest_handler(
    State(state): State<AppState>,
    _auth: Authorized,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let start = Instant::now();

    let request: IngestRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Failed to parse ingest request");
        ApiError::bad_request(format!("Malformed request body: {}", e))
    })?;

    let total = request.activity_record_list.len();
    info!(records = total, "Received ingest request");

    if let Err(problems) = validate_records(&request.activity_record_list) {
        warn!(errors = ?problems, "Ingest request failed validation");
        return Err(ApiError::validation(problems));
    }

    let mut ingested = 0;
    for record in &request.activity_record_list {
        match state.publisher.publish_raw(record).await {
            Ok(()) => {
                ingested += 1;
                debug!(record_id = record.id, "Published record to raw queue");
            }
            Err(e) => {
                error!(record_id = record.id, error = %e, "Failed to publish record to raw queue");
            }
        }
    }

    state.metrics.records_ingested.inc_by(ingested as u64);

    info!(
        ingested = ingested,
        total = total,
        total_ingested = state.metrics.records_ingested.get(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Ingested {} out of {} records to raw queue",
        ingested,
        total
    );

    Ok(Json(IngestResponse::ingested(ingested)))
}
