//! Unified error types for the log processor.
//!
//! Every failure that crosses a pipeline boundary carries an [`ErrorKind`]
//! so retry and dead-letter routing branch on the tag instead of on the
//! concrete variant:
//! - `Transient`: timeout, 5xx, network. Retried.
//! - `ClientError`: 4xx other than 429. Retried by the dispatcher only.
//! - `Quota`: 429 from the analytics backend. Never retried.
//! - `PublishFailure`: the broker refused a message.
//! - `CircuitOpen`: rejected by a breaker without touching the dependency.
//! - `PermitTimeout`: no rate-limiter permit within the configured wait.
//! - `Shutdown`: work still unsettled when the drain deadline passed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classification used for retry and dead-letter routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Transient,
    Quota,
    ClientError,
    PublishFailure,
    CircuitOpen,
    PermitTimeout,
    Shutdown,
    Validation,
    Serialization,
    Config,
    Internal,
}

impl ErrorKind {
    /// Name written into dead-letter messages as `errorType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "Transient",
            Self::Quota => "Quota",
            Self::ClientError => "ClientError",
            Self::PublishFailure => "PublishFailure",
            Self::CircuitOpen => "CircuitOpen",
            Self::PermitTimeout => "PermitTimeout",
            Self::Shutdown => "Shutdown",
            Self::Validation => "Validation",
            Self::Serialization => "Serialization",
            Self::Config => "Config",
            Self::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the log processor.
#[derive(Debug, Error)]
pub enum Error {
    /// Timeout, connection failure or 5xx from a downstream dependency.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The analytics backend rejected the request with 429.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A 4xx response other than 429.
    #[error("client error ({status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("publish failure: {0}")]
    PublishFailure(String),

    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("rate limiter permit not acquired within {0:?}")]
    PermitTimeout(Duration),

    #[error("shutdown before completion: {0}")]
    Shutdown(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn client_error(status: u16, msg: impl Into<String>) -> Self {
        Self::ClientError {
            status,
            message: msg.into(),
        }
    }

    pub fn publish_failure(msg: impl Into<String>) -> Self {
        Self::PublishFailure(msg.into())
    }

    pub fn circuit_open(name: impl Into<String>) -> Self {
        Self::CircuitOpen(name.into())
    }

    pub fn shutdown(msg: impl Into<String>) -> Self {
        Self::Shutdown(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify an HTTP status returned by a downstream gateway.
    ///
    /// Returns `None` for success statuses.
    pub fn from_status(status: u16, body: impl Into<String>) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(Self::quota_exceeded(body)),
            400..=499 => Some(Self::client_error(status, body)),
            _ => Some(Self::transient(format!("status {}: {}", status, body.into()))),
        }
    }

    /// Get the failure classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::Transient,
            Self::QuotaExceeded(_) => ErrorKind::Quota,
            Self::ClientError { .. } => ErrorKind::ClientError,
            Self::PublishFailure(_) => ErrorKind::PublishFailure,
            Self::CircuitOpen(_) => ErrorKind::CircuitOpen,
            Self::PermitTimeout(_) => ErrorKind::PermitTimeout,
            Self::Shutdown(_) => ErrorKind::Shutdown,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Get the HTTP status code for this error at the ingestion surface.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Serialization(_) => 400,
            Self::QuotaExceeded(_) => 429,
            Self::Transient(_)
            | Self::CircuitOpen(_)
            | Self::PermitTimeout(_)
            | Self::Shutdown(_) => 503,
            _ => 500,
        }
    }
}
