//! Redpanda producer using rskafka.

use async_trait::async_trait;
use chrono::Utc;
use processor_core::{ActivityRecord, DeadLetter, EnrichedRecord, Error, Result};
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::record::Record;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::config::BrokerConfig;
use crate::connection::connect;
use crate::publisher::RecordPublisher;

/// Publishes pipeline messages as JSON records on partition 0 of each topic.
pub struct Producer {
    config: BrokerConfig,
    /// Cached partition clients per topic
    clients: RwLock<BTreeMap<String, Arc<PartitionClient>>>,
}

impl Producer {
    /// Creates a new producer. Connections are opened lazily per topic.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(BTreeMap::new()),
        }
    }

    /// Gets or creates a partition client for a topic.
    async fn get_client(&self, topic: &str) -> Result<Arc<PartitionClient>> {
        // Check cache first
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(topic) {
                return Ok(client.clone());
            }
        }

        let client = connect(&self.config).await?;
        let partition_client = client
            .partition_client(topic.to_string(), 0, UnknownTopicHandling::Error)
            .await
            .map_err(|e| {
                Error::publish_failure(format!("Failed to get partition client: {}", e))
            })?;

        let partition_client = Arc::new(partition_client);

        {
            let mut clients = self.clients.write().await;
            clients.insert(topic.to_string(), partition_client.clone());
        }

        Ok(partition_client)
    }

    fn compression(&self) -> Compression {
        match self.config.compression.as_str() {
            "gzip" => Compression::Gzip,
            "snappy" => Compression::Snappy,
            "lz4" => Compression::Lz4,
            "zstd" => Compression::Zstd,
            _ => Compression::NoCompression,
        }
    }

    /// Serializes `value` and produces it to `topic`.
    async fn produce<T: Serialize + Sync>(&self, topic: &str, key: String, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        let client = self.get_client(topic).await?;

        let record = Record {
            key: Some(key.into_bytes()),
            value: Some(payload),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        match client.produce(vec![record], self.compression()).await {
            Ok(_offsets) => {
                debug!(topic = %topic, "Produced record to Redpanda");
                Ok(())
            }
            Err(e) => {
                error!(topic = %topic, error = %e, "Failed to produce record to Redpanda");
                // Drop the cached client so the next publish reconnects.
                self.clients.write().await.remove(topic);
                Err(Error::publish_failure(format!("Failed to produce: {}", e)))
            }
        }
    }
}

#[async_trait]
impl RecordPublisher for Producer {
    async fn publish_raw(&self, record: &ActivityRecord) -> Result<()> {
        self.produce(&self.config.topics.raw, record.id.to_string(), record)
            .await
    }

    async fn publish_enriched(&self, record: &EnrichedRecord) -> Result<()> {
        self.produce(&self.config.topics.enriched, record.id.to_string(), record)
            .await
    }

    async fn publish_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        self.produce(&self.config.topics.dead_letter, letter.id.to_string(), letter)
            .await
    }
}
