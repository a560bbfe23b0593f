//! In-process broker backed by bounded tokio channels.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use processor_core::{ActivityRecord, DeadLetter, EnrichedRecord, Error, Result};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::publisher::RecordPublisher;

/// Dead letters retained when no capacity is configured.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 10_000;

/// In-memory broker.
///
/// Publishing never blocks: a full or closed queue is reported as a
/// publish failure so callers can dead-letter instead of stalling. Closing
/// a queue drops its sender, so the consumer sees the end of the stream
/// once the buffered records are read.
///
/// Dead letters are retained up to a fixed capacity; past it the oldest
/// entry is evicted and counted.
pub struct InMemoryBroker {
    raw_tx: Mutex<Option<mpsc::Sender<ActivityRecord>>>,
    raw_rx: Mutex<Option<mpsc::Receiver<ActivityRecord>>>,
    enriched_tx: Mutex<Option<mpsc::Sender<EnrichedRecord>>>,
    enriched_rx: Mutex<Option<mpsc::Receiver<EnrichedRecord>>>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    dead_letter_capacity: usize,
    evicted: AtomicU64,
}

impl InMemoryBroker {
    /// Creates a broker whose queues hold up to `capacity` messages each.
    pub fn new(capacity: usize) -> Self {
        let (raw_tx, raw_rx) = mpsc::channel(capacity.max(1));
        let (enriched_tx, enriched_rx) = mpsc::channel(capacity.max(1));

        Self {
            raw_tx: Mutex::new(Some(raw_tx)),
            raw_rx: Mutex::new(Some(raw_rx)),
            enriched_tx: Mutex::new(Some(enriched_tx)),
            enriched_rx: Mutex::new(Some(enriched_rx)),
            dead_letters: Mutex::new(VecDeque::new()),
            dead_letter_capacity: DEFAULT_DEAD_LETTER_CAPACITY,
            evicted: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.queue_capacity).with_dead_letter_capacity(config.dead_letter_capacity)
    }

    pub fn with_dead_letter_capacity(mut self, capacity: usize) -> Self {
        self.dead_letter_capacity = capacity.max(1);
        self
    }

    /// Takes the raw-record receiver. Returns `None` after the first call.
    pub fn take_raw_receiver(&self) -> Option<mpsc::Receiver<ActivityRecord>> {
        self.raw_rx.lock().take()
    }

    /// Takes the enriched-record receiver. Returns `None` after the first call.
    pub fn take_enriched_receiver(&self) -> Option<mpsc::Receiver<EnrichedRecord>> {
        self.enriched_rx.lock().take()
    }

    /// Retained dead letters, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().iter().cloned().collect()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().len()
    }

    /// Dead letters dropped to stay within capacity.
    pub fn evicted_dead_letters(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

fn enqueue<T>(slot: &Mutex<Option<mpsc::Sender<T>>>, item: T, queue: &str) -> Result<()> {
    let Some(tx) = slot.lock().clone() else {
        return Err(Error::publish_failure(format!("{} queue is closed", queue)));
    };

    match tx.try_send(item) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            warn!(queue = queue, "Queue full, refusing publish");
            Err(Error::publish_failure(format!("{} queue is full", queue)))
        }
        Err(TrySendError::Closed(_)) => {
            Err(Error::publish_failure(format!("{} queue is closed", queue)))
        }
    }
}

fn is_open<T>(slot: &Mutex<Option<mpsc::Sender<T>>>) -> bool {
    slot.lock().as_ref().is_some_and(|tx| !tx.is_closed())
}

#[async_trait]
impl RecordPublisher for InMemoryBroker {
    async fn publish_raw(&self, record: &ActivityRecord) -> Result<()> {
        enqueue(&self.raw_tx, record.clone(), "raw")?;
        debug!(record_id = record.id, "Published record to raw queue");
        Ok(())
    }

    async fn publish_enriched(&self, record: &EnrichedRecord) -> Result<()> {
        enqueue(&self.enriched_tx, record.clone(), "enriched")
    }

    async fn publish_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let mut letters = self.dead_letters.lock();
        if letters.len() >= self.dead_letter_capacity {
            if let Some(oldest) = letters.pop_front() {
                let evicted = self.evicted.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    dead_letter_id = %oldest.id,
                    error_type = oldest.error_type(),
                    records = oldest.record_count(),
                    capacity = self.dead_letter_capacity,
                    evicted_total = evicted,
                    "Dead-letter store full, evicting oldest entry"
                );
            }
        }
        letters.push_back(letter.clone());
        Ok(())
    }

    fn close_raw(&self) {
        if self.raw_tx.lock().take().is_some() {
            info!("Raw queue closed");
        }
    }

    fn close_enriched(&self) {
        if self.enriched_tx.lock().take().is_some() {
            info!("Enriched queue closed");
        }
    }

    fn is_healthy(&self) -> bool {
        is_open(&self.raw_tx) && is_open(&self.enriched_tx)
    }
}
