//! Redpanda client construction shared by producer, consumer and health checks.

use processor_core::{Error, Result};
use rskafka::client::{Client, ClientBuilder, Credentials, SaslConfig};
use std::sync::Arc;

use crate::config::BrokerConfig;

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Connects to the configured brokers, adding TLS and SASL when credentials are set.
pub async fn connect(config: &BrokerConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(vec![config.broker_string()]);

    if let (Some(username), Some(password)) = (&config.sasl_username, &config.sasl_password) {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.clone(),
                password.clone(),
            )));
    }

    builder
        .build()
        .await
        .map_err(|e| Error::publish_failure(format!("Failed to connect to Redpanda: {}", e)))
}
