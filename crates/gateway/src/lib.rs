//! Downstream HTTP gateways.
//!
//! The pipeline talks to the enrichment lookup service and the analytics
//! backend only through the [`EnrichmentGateway`] and [`AnalyticsGateway`]
//! traits. The reqwest clients here classify every failure into an
//! [`processor_core::ErrorKind`] before it leaves the crate.

pub mod analytics;
pub mod client;
pub mod config;
pub mod enrichment;

pub use analytics::{AnalyticsGateway, HttpAnalyticsGateway};
pub use config::GatewayConfig;
pub use enrichment::{EnrichmentGateway, HttpEnrichmentGateway};
