//! Record transport for the log processor.
//!
//! Carries records between pipeline stages either over in-process channels
//! or Redpanda topics, and groups enriched records into dispatch windows.

pub mod batch;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod health;
pub mod memory;
pub mod producer;
pub mod publisher;
pub mod topics;

pub use batch::{BatchConfig, BatchWindow};
pub use config::*;
pub use consumer::{Consumer, Offset, Pump};
pub use memory::InMemoryBroker;
pub use producer::Producer;
pub use publisher::RecordPublisher;
pub use topics::*;
