//! Enrichment lookup gateway.

use async_trait::async_trait;
use processor_core::{EnrichmentRequest, EnrichmentResponse, Result};
use tracing::debug;

use crate::client::JsonClient;
use crate::config::GatewayConfig;

/// One lookup per raw record.
#[async_trait]
pub trait EnrichmentGateway: Send + Sync {
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichmentResponse>;
}

/// HTTP client for the enrichment service.
pub struct HttpEnrichmentGateway {
    client: JsonClient,
}

impl HttpEnrichmentGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new(config)?,
        })
    }
}

#[async_trait]
impl EnrichmentGateway for HttpEnrichmentGateway {
    async fn enrich(&self, request: &EnrichmentRequest) -> Result<EnrichmentResponse> {
        let response: EnrichmentResponse = self.client.post(request).await?;
        debug!(
            record_id = request.id,
            correlation_id = response.correlation_id,
            "Enrichment lookup succeeded"
        );
        Ok(response)
    }
}
