//! Redpanda health checks.

use tracing::{debug, error};

use crate::config::BrokerConfig;
use crate::connection::connect;

/// Check Redpanda connection health.
pub async fn check_connection(config: &BrokerConfig) -> bool {
    match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                debug!(topics = topics.len(), "Redpanda connection healthy");
                true
            }
            Err(e) => {
                error!("Failed to list Redpanda topics: {}", e);
                false
            }
        },
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

/// Returns the configured topics that do not exist on the cluster.
pub async fn verify_topics(config: &BrokerConfig) -> Vec<String> {
    let wanted: Vec<String> = config.topics.all().iter().map(|t| t.to_string()).collect();

    match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(existing_topics) => {
                let existing: std::collections::HashSet<_> =
                    existing_topics.iter().map(|t| t.name.as_str()).collect();

                wanted
                    .into_iter()
                    .filter(|t| !existing.contains(t.as_str()))
                    .collect()
            }
            Err(_) => wanted,
        },
        Err(_) => wanted,
    }
}
