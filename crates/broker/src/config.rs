//! Broker configuration.

use serde::{Deserialize, Serialize};

use crate::topics::TopicNames;

/// Which transport carries records between stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerMode {
    /// In-process bounded channels; dead letters kept in memory.
    #[default]
    Memory,
    /// Redpanda (Kafka protocol) topics.
    Redpanda,
}

/// Where a consumer starts when it has no position yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    Earliest,
    #[default]
    Latest,
}

/// Broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub mode: BrokerMode,
    /// Broker addresses
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    /// SASL username (for cloud authentication)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (for cloud authentication)
    #[serde(default)]
    pub sasl_password: Option<String>,
    #[serde(default)]
    pub topics: TopicNames,
    /// Raw records handed to the enrichment pool ahead of processing
    #[serde(default = "default_raw_prefetch")]
    pub raw_prefetch: usize,
    /// Enriched records buffered ahead of the aggregator
    #[serde(default = "default_enriched_prefetch")]
    pub enriched_prefetch: usize,
    /// In-memory queue depth before publishes are refused
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Dead letters retained by the in-memory broker before the oldest are evicted
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,
    /// Fetch long-poll wait in milliseconds
    #[serde(default = "default_fetch_max_wait_ms")]
    pub fetch_max_wait_ms: u64,
    /// Compression type (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default)]
    pub offset_reset: OffsetReset,
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_raw_prefetch() -> usize {
    32
}

fn default_enriched_prefetch() -> usize {
    20
}

fn default_queue_capacity() -> usize {
    100_000
}

fn default_dead_letter_capacity() -> usize {
    crate::memory::DEFAULT_DEAD_LETTER_CAPACITY
}

fn default_fetch_max_wait_ms() -> u64 {
    500
}

fn default_compression() -> String {
    "lz4".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mode: BrokerMode::default(),
            brokers: default_brokers(),
            sasl_username: None,
            sasl_password: None,
            topics: TopicNames::default(),
            raw_prefetch: default_raw_prefetch(),
            enriched_prefetch: default_enriched_prefetch(),
            queue_capacity: default_queue_capacity(),
            dead_letter_capacity: default_dead_letter_capacity(),
            fetch_max_wait_ms: default_fetch_max_wait_ms(),
            compression: default_compression(),
            offset_reset: OffsetReset::default(),
        }
    }
}

impl BrokerConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// Whether SASL credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.sasl_username.is_some() && self.sasl_password.is_some()
    }
}
