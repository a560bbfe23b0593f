//! Application state shared across handlers.

use broker::RecordPublisher;
use std::sync::Arc;
use telemetry::Metrics;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Raw-record publisher (in-memory broker, Redpanda, or a mock in tests)
    pub publisher: Arc<dyn RecordPublisher>,
    pub metrics: Arc<Metrics>,
    /// Required `Authorization` value; `None` accepts any non-empty header
    pub auth_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(publisher: Arc<dyn RecordPublisher>, metrics: Arc<Metrics>) -> Self {
        Self {
            publisher,
            metrics,
            auth_token: None,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        let token: String = token.into();
        self.auth_token = Some(Arc::from(token));
        self
    }
}
