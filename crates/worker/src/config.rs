//! Stage configuration for the enrichment and dispatch workers.

use std::time::Duration;

use gateway::GatewayConfig;
use processor_core::limits::MAX_ANALYTICS_BATCH_SIZE;
use processor_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryConfig};

/// Enrichment stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Enrichment service endpoint
    #[serde(default = "default_enrichment_url")]
    pub url: String,
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Records enriched in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Analytics stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Analytics backend endpoint
    #[serde(default = "default_analytics_url")]
    pub url: String,
    #[serde(default)]
    pub auth_header: Option<String>,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Window length after the first record of a batch
    #[serde(default = "default_batch_wait_ms")]
    pub batch_wait_ms: u64,
    #[serde(default)]
    pub rate_limit: RateLimiterConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

fn default_enrichment_url() -> String {
    "http://localhost:9001/enrich".to_string()
}

fn default_analytics_url() -> String {
    "http://localhost:9002/analytics".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_concurrency() -> usize {
    8
}

fn default_batch_size() -> usize {
    MAX_ANALYTICS_BATCH_SIZE
}

fn default_batch_wait_ms() -> u64 {
    1_000
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            url: default_enrichment_url(),
            auth_header: None,
            timeout_ms: default_timeout_ms(),
            concurrency: default_concurrency(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            url: default_analytics_url(),
            auth_header: None,
            timeout_ms: default_timeout_ms(),
            batch_size: default_batch_size(),
            batch_wait_ms: default_batch_wait_ms(),
            rate_limit: RateLimiterConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl EnrichmentConfig {
    pub fn gateway(&self) -> GatewayConfig {
        let mut gateway = GatewayConfig::new(self.url.clone());
        gateway.auth_header = self.auth_header.clone();
        gateway.timeout_ms = self.timeout_ms;
        gateway
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.gateway().endpoint()?;
        if self.timeout_ms == 0 {
            return Err(Error::config("enrichment.timeout_ms must be positive"));
        }
        if self.concurrency == 0 {
            return Err(Error::config("enrichment.concurrency must be positive"));
        }
        self.retry.validate()?;
        self.circuit_breaker.validate()
    }
}

impl AnalyticsConfig {
    pub fn gateway(&self) -> GatewayConfig {
        let mut gateway = GatewayConfig::new(self.url.clone());
        gateway.auth_header = self.auth_header.clone();
        gateway.timeout_ms = self.timeout_ms;
        gateway
    }

    pub fn batch_wait(&self) -> Duration {
        Duration::from_millis(self.batch_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.gateway().endpoint()?;
        if self.batch_size == 0 || self.batch_size > MAX_ANALYTICS_BATCH_SIZE {
            return Err(Error::config(format!(
                "analytics.batch_size must be between 1 and {}",
                MAX_ANALYTICS_BATCH_SIZE
            )));
        }
        if self.batch_wait_ms == 0 {
            return Err(Error::config("analytics.batch_wait_ms must be positive"));
        }
        self.rate_limit.validate()?;
        self.retry.validate()?;
        self.circuit_breaker.validate()
    }
}

/// Everything the worker scheduler needs to build the pipeline.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub enrichment: EnrichmentConfig,
    pub analytics: AnalyticsConfig,
    /// Period of the metrics summary log; `None` disables it
    pub metrics_log_interval: Option<Duration>,
}
