//! Hard limits shared across the pipeline.
//!
//! The analytics backend accepts at most 20 records per request and one
//! request per 10 seconds. The batch limit is enforced by [`crate::Batch`];
//! the interval is deployment configuration carried by the dispatcher.

/// Maximum records per analytics request.
pub const MAX_ANALYTICS_BATCH_SIZE: usize = 20;

/// Maximum records accepted by a single ingest request.
pub const MAX_INGEST_RECORDS: usize = 10_000;

/// Maximum hostname length (RFC 1035).
pub const MAX_HOSTNAME_LEN: usize = 253;
