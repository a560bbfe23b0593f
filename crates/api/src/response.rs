//! Standardized API responses.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use processor_core::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use telemetry::{ComponentHealthReport, HealthStatus};

/// Success response for ingestion.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub records_ingested: usize,
    pub message: String,
}

impl IngestResponse {
    pub fn ingested(records_ingested: usize) -> Self {
        Self {
            records_ingested,
            message: "Records Ingested to raw queue".to_string(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            errors: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_errors(mut self, errors: BTreeMap<String, String>) -> Self {
        self.errors = Some(errors);
        self
    }
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(status, msg),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// 400 with one message per offending field.
    pub fn validation(errors: impl IntoIterator<Item = (String, String)>) -> Self {
        let status = StatusCode::BAD_REQUEST;
        Self {
            status,
            response: ErrorResponse::new(status, "Validation failed")
                .with_errors(errors.into_iter().collect()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err.kind() {
            ErrorKind::Validation | ErrorKind::Serialization => ApiError::bad_request(err.to_string()),
            ErrorKind::Quota => ApiError::new(StatusCode::TOO_MANY_REQUESTS, err.to_string()),
            ErrorKind::PublishFailure => {
                ApiError::internal(format!("Failed to publish message: {}", err))
            }
            _ => ApiError::internal(err.to_string()),
        }
    }
}
