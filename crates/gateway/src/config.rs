//! Gateway endpoint configuration.

use processor_core::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Connection settings for one downstream HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Endpoint receiving the POST
    pub url: String,
    /// Value sent as the `Authorization` header, if any
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Whole-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    3_000
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_header: None,
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }

    pub fn with_auth_header(mut self, value: impl Into<String>) -> Self {
        self.auth_header = Some(value.into());
        self
    }

    /// Parses the endpoint, rejecting empty or non-HTTP URLs.
    pub fn endpoint(&self) -> Result<Url> {
        if self.url.trim().is_empty() {
            return Err(Error::config("gateway url is empty"));
        }
        let url = Url::parse(&self.url)
            .map_err(|e| Error::config(format!("invalid gateway url '{}': {}", self.url, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::config(format!(
                "gateway url '{}' has unsupported scheme '{}'",
                self.url, other
            ))),
        }
    }
}
