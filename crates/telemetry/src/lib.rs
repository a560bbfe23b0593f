//! Internal telemetry for the log processor.
//!
//! Metrics are plain atomics owned by whoever builds the pipeline and
//! handed out as `Arc<Metrics>`; health is a process-wide registry.

pub mod health;
pub mod metrics;
pub mod timing;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use timing::*;
pub use tracing_setup::*;
