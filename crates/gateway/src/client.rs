//! Shared reqwest plumbing and failure classification.

use std::time::Duration;

use processor_core::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::GatewayConfig;

/// A JSON-over-HTTP POST client bound to one endpoint.
#[derive(Debug, Clone)]
pub struct JsonClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl JsonClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;

        let mut headers = HeaderMap::new();
        if let Some(ref auth) = config.auth_header {
            let value = HeaderValue::from_str(auth)
                .map_err(|e| Error::config(format!("invalid auth header: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POSTs `body` and decodes a 2xx response as `R`.
    pub async fn post<B, R>(&self, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(endpoint = %self.endpoint, status = status, "Gateway rejected request");
            return Err(Error::from_status(status, text)
                .unwrap_or_else(|| Error::internal(format!("unexpected status {}", status))));
        }

        let bytes = response.bytes().await.map_err(classify_transport)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Everything reqwest reports before a status line is transient.
pub fn classify_transport(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::transient(format!("request timed out: {}", err))
    } else if err.is_connect() {
        Error::transient(format!("connection failed: {}", err))
    } else {
        Error::transient(format!("request failed: {}", err))
    }
}
