//! Redpanda consumer feeding pipeline stages.
//!
//! Uses rskafka with:
//! - Auto-ack: the offset advances once a fetched batch is handed to the
//!   stage channel; later failures are dead-lettered, never redelivered
//! - Long-poll fetches bounded by `fetch_max_wait_ms`
//! - JSON deserialization into the stage's record type

use processor_core::{Error, Result};
use rskafka::client::partition::{OffsetAt, PartitionClient, UnknownTopicHandling};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{BrokerConfig, OffsetReset};
use crate::connection::connect;

/// Assume ~64KB max per record when sizing fetches.
const MAX_RECORD_BYTES: usize = 64 * 1024;

/// Read position committed once a fetched run is handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub partition: i32,
    pub offset: i64,
}

/// Consumer for one topic, decoding each message as `T`.
pub struct Consumer<T> {
    config: BrokerConfig,
    topic: String,
    /// Records requested per fetch
    max_records: usize,
    /// Partition client (currently only partition 0)
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
    /// Current offset (next offset to read)
    current_offset: AtomicI64,
    initialized: AtomicBool,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send + 'static> Consumer<T> {
    pub fn new(config: BrokerConfig, topic: impl Into<String>, max_records: usize) -> Self {
        let topic = topic.into();
        info!(topic = %topic, max_records = max_records, "Creating Redpanda consumer");

        Self {
            config,
            topic,
            max_records: max_records.max(1),
            partition_client: RwLock::new(None),
            current_offset: AtomicI64::new(-1),
            initialized: AtomicBool::new(false),
            _record: PhantomData,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let client = connect(&self.config).await?;
        let partition_client = client
            .partition_client(self.topic.clone(), 0, UnknownTopicHandling::Error)
            .await
            .map_err(|e| Error::internal(format!("Failed to get partition client: {}", e)))?;
        let partition_client = Arc::new(partition_client);

        if !self.initialized.load(Ordering::SeqCst) {
            let at = match self.config.offset_reset {
                OffsetReset::Earliest => OffsetAt::Earliest,
                OffsetReset::Latest => OffsetAt::Latest,
            };
            let offset = partition_client
                .get_offset(at)
                .await
                .map_err(|e| Error::internal(format!("Failed to get offset: {}", e)))?;

            self.current_offset.store(offset, Ordering::SeqCst);
            self.initialized.store(true, Ordering::SeqCst);

            info!(topic = %self.topic, partition = 0, offset = offset, "Consumer initialized at offset");
        }

        {
            let mut guard = self.partition_client.write().await;
            *guard = Some(partition_client.clone());
        }

        Ok(partition_client)
    }

    /// Fetches the next run of records.
    ///
    /// Returns the decoded records and the offset to commit once they have
    /// been handed off. Undecodable messages are skipped but still advance
    /// the offset.
    pub async fn fetch_batch(&self) -> Result<(Vec<T>, Option<Offset>)> {
        let client = self.ensure_connected().await?;

        let current = self.current_offset.load(Ordering::SeqCst);
        let max_bytes = (self.max_records * MAX_RECORD_BYTES).min(i32::MAX as usize) as i32;
        let max_wait_ms = self.config.fetch_max_wait_ms.min(i32::MAX as u64) as i32;

        let (records, _watermark) = client
            .fetch_records(current, 1..max_bytes, max_wait_ms)
            .await
            .map_err(|e| Error::internal(format!("Failed to fetch records: {}", e)))?;

        if records.is_empty() {
            return Ok((Vec::new(), None));
        }

        let mut decoded = Vec::with_capacity(records.len());
        let mut max_offset = current;

        for record in records {
            max_offset = record.offset.max(max_offset);

            if let Some(value) = record.record.value {
                match serde_json::from_slice::<T>(&value) {
                    Ok(item) => decoded.push(item),
                    Err(e) => {
                        warn!(topic = %self.topic, offset = record.offset, error = %e, "Skipping undecodable message");
                    }
                }
            }
        }

        debug!(
            topic = %self.topic,
            records = decoded.len(),
            offset_start = current,
            offset_end = max_offset,
            "Fetched records from Redpanda"
        );

        Ok((
            decoded,
            Some(Offset {
                partition: 0,
                offset: max_offset + 1,
            }),
        ))
    }

    /// Advances the read position past a handed-off run.
    pub fn commit(&self, offset: Offset) {
        let prev = self.current_offset.swap(offset.offset, Ordering::SeqCst);
        debug!(topic = %self.topic, prev_offset = prev, new_offset = offset.offset, "Committed offset");
    }

    pub fn current_offset(&self) -> i64 {
        self.current_offset.load(Ordering::SeqCst)
    }

    /// Drops the cached connection so the next fetch reconnects.
    pub async fn reset_connection(&self) {
        let mut client = self.partition_client.write().await;
        *client = None;
        info!(topic = %self.topic, "Consumer connection reset");
    }

    /// Spawns a task that forwards decoded records into `tx`.
    ///
    /// `tx` should be bounded by the stage's prefetch, so at most that many
    /// records are held ahead of processing. The task ends when `tx` closes
    /// or the returned pump is stopped.
    pub fn spawn_pump(self: Arc<Self>, tx: mpsc::Sender<T>) -> Pump {
        let stop = CancellationToken::new();
        let token = stop.clone();

        let task = tokio::spawn(async move {
            info!(topic = %self.topic, "Consumer pump starting");

            loop {
                let fetched = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    fetched = self.fetch_batch() => fetched,
                };

                match fetched {
                    Ok((records, offset)) => {
                        // A fetched run is always handed off in full.
                        for record in records {
                            if tx.send(record).await.is_err() {
                                info!(topic = %self.topic, "Downstream closed, consumer pump stopping");
                                return;
                            }
                        }
                        if let Some(offset) = offset {
                            self.commit(offset);
                        }
                    }
                    Err(e) => {
                        error!(topic = %self.topic, error = %e, "Fetch error");
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        }
                        self.reset_connection().await;
                    }
                }
            }

            info!(topic = %self.topic, offset = self.current_offset(), "Consumer pump stopped");
        });

        Pump { stop, task }
    }
}

/// A running consumer pump.
pub struct Pump {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl Pump {
    /// Stops fetching and waits for the pump to hand off what it holds.
    ///
    /// Dropping the pump's sender closes the stage channel once its
    /// buffered records are consumed.
    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                error!(error = %e, "Consumer pump panicked");
            }
        }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}
