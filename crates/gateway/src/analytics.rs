//! Analytics backend gateway.

use async_trait::async_trait;
use processor_core::{AnalyticsBatchResponse, EnrichedRecord, Result};
use tracing::debug;

use crate::client::JsonClient;
use crate::config::GatewayConfig;

/// Accepts one batch of enriched records per call.
///
/// A 429 surfaces as `ErrorKind::Quota`, other 4xx as `ClientError`, and
/// timeouts, connection failures and 5xx as `Transient`.
#[async_trait]
pub trait AnalyticsGateway: Send + Sync {
    async fn send_batch(&self, records: &[EnrichedRecord]) -> Result<AnalyticsBatchResponse>;
}

/// HTTP client for the analytics backend.
pub struct HttpAnalyticsGateway {
    client: JsonClient,
}

impl HttpAnalyticsGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new(config)?,
        })
    }
}

#[async_trait]
impl AnalyticsGateway for HttpAnalyticsGateway {
    async fn send_batch(&self, records: &[EnrichedRecord]) -> Result<AnalyticsBatchResponse> {
        let response: AnalyticsBatchResponse = self.client.post(records).await?;
        debug!(
            records = records.len(),
            status = %response.status,
            items_ingested = response.items_ingested,
            "Analytics batch accepted"
        );
        Ok(response)
    }
}
