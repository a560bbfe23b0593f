//! Log Processor
//!
//! Activity-record pipeline:
//! - HTTP ingestion with per-field validation
//! - Enrichment through a circuit breaker, retry and per-call timeout
//! - Size/time batch windows dispatched to analytics under a global rate limit
//! - Dead-letter routing for every record that cannot complete

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use api::{router, AppState};
use broker::{
    BrokerConfig, BrokerMode, Consumer, InMemoryBroker, Producer, Pump, RecordPublisher,
};
use gateway::{AnalyticsGateway, EnrichmentGateway, HttpAnalyticsGateway, HttpEnrichmentGateway};
use processor_core::{ActivityRecord, EnrichedRecord};
use telemetry::{health, init_tracing_from_env, Metrics};
use worker::{AnalyticsConfig, EnrichmentConfig, WorkerConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Required `Authorization` value on the ingest endpoint
    #[serde(default)]
    auth_token: Option<String>,

    #[serde(default)]
    broker: BrokerConfig,

    #[serde(default)]
    enrichment: EnrichmentConfig,

    #[serde(default)]
    analytics: AnalyticsConfig,

    /// Period of the metrics summary log; 0 disables it
    #[serde(default = "default_metrics_log_interval_secs")]
    metrics_log_interval_secs: u64,

    /// Upper bound on draining the pipeline after a shutdown signal
    #[serde(default = "default_shutdown_timeout_secs")]
    shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_metrics_log_interval_secs() -> u64 {
    60
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_token: None,
            broker: BrokerConfig::default(),
            enrichment: EnrichmentConfig::default(),
            analytics: AnalyticsConfig::default(),
            metrics_log_interval_secs: default_metrics_log_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        self.enrichment
            .validate()
            .context("Invalid enrichment configuration")?;
        self.analytics
            .validate()
            .context("Invalid analytics configuration")?;
        if self.broker.mode == BrokerMode::Redpanda && self.broker.brokers.is_empty() {
            return Err(anyhow!("broker.brokers must not be empty in redpanda mode"));
        }
        Ok(())
    }

    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            enrichment: self.enrichment.clone(),
            analytics: self.analytics.clone(),
            metrics_log_interval: (self.metrics_log_interval_secs > 0)
                .then(|| Duration::from_secs(self.metrics_log_interval_secs)),
        }
    }
}

/// Channels feeding the enrichment pool and the aggregator.
struct Transport {
    publisher: Arc<dyn RecordPublisher>,
    raw_rx: mpsc::Receiver<ActivityRecord>,
    enriched_rx: mpsc::Receiver<EnrichedRecord>,
    /// Consumer pumps for the raw and enriched topics
    pumps: Option<(Pump, Pump)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider BEFORE any TLS operations
    // rustls 0.23+ requires explicit crypto provider selection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Log Processor v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    config.validate()?;

    info!(
        mode = ?config.broker.mode,
        brokers = ?config.broker.brokers,
        enrichment_url = %config.enrichment.url,
        analytics_url = %config.analytics.url,
        "Loaded configuration"
    );

    let metrics = Arc::new(Metrics::new());

    let enrichment_gateway: Arc<dyn EnrichmentGateway> = Arc::new(
        HttpEnrichmentGateway::new(&config.enrichment.gateway())
            .context("Failed to create enrichment gateway")?,
    );
    let analytics_gateway: Arc<dyn AnalyticsGateway> = Arc::new(
        HttpAnalyticsGateway::new(&config.analytics.gateway())
            .context("Failed to create analytics gateway")?,
    );

    let transport = match config.broker.mode {
        BrokerMode::Memory => memory_transport(&config.broker)?,
        BrokerMode::Redpanda => redpanda_transport(&config.broker).await,
    };

    let scheduler = WorkerScheduler::new(
        config.worker_config(),
        transport.publisher.clone(),
        enrichment_gateway,
        analytics_gateway,
        metrics.clone(),
    );
    let mut pipeline = scheduler.start(transport.raw_rx, transport.enriched_rx);
    if let Some((raw, enriched)) = transport.pumps {
        pipeline = pipeline.with_intakes(raw, enriched);
    }

    let mut state = AppState::new(transport.publisher, metrics.clone());
    match config.auth_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => state = state.with_auth_token(token),
        None => warn!("No auth_token configured, accepting any Authorization header"),
    }

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down...");

    pipeline
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    let snapshot = metrics.snapshot();
    info!(
        records_ingested = snapshot.records_ingested,
        records_enriched = snapshot.records_enriched,
        batches_processed = snapshot.batches_processed,
        analytics_failures = snapshot.analytics_failures,
        dead_letters_published = snapshot.dead_letters_published,
        dead_letter_publish_failures = snapshot.dead_letter_publish_failures,
        "Shutdown complete"
    );
    Ok(())
}

fn memory_transport(config: &BrokerConfig) -> Result<Transport> {
    let broker = Arc::new(InMemoryBroker::from_config(config));
    let raw_rx = broker
        .take_raw_receiver()
        .context("Raw receiver already taken")?;
    let enriched_rx = broker
        .take_enriched_receiver()
        .context("Enriched receiver already taken")?;

    health().broker.set_healthy();
    info!(capacity = config.queue_capacity, "Using in-memory broker");

    Ok(Transport {
        publisher: broker,
        raw_rx,
        enriched_rx,
        pumps: None,
    })
}

async fn redpanda_transport(config: &BrokerConfig) -> Transport {
    check_health(config).await;

    let publisher: Arc<dyn RecordPublisher> = Arc::new(Producer::new(config.clone()));

    let raw_consumer = Arc::new(Consumer::<ActivityRecord>::new(
        config.clone(),
        config.topics.raw.clone(),
        config.raw_prefetch,
    ));
    let (raw_tx, raw_rx) = mpsc::channel(config.raw_prefetch.max(1));

    let enriched_consumer = Arc::new(Consumer::<EnrichedRecord>::new(
        config.clone(),
        config.topics.enriched.clone(),
        config.enriched_prefetch,
    ));
    let (enriched_tx, enriched_rx) = mpsc::channel(config.enriched_prefetch.max(1));

    let pumps = (
        raw_consumer.spawn_pump(raw_tx),
        enriched_consumer.spawn_pump(enriched_tx),
    );

    Transport {
        publisher,
        raw_rx,
        enriched_rx,
        pumps: Some(pumps),
    }
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables, e.g. LOG_PROCESSOR_ANALYTICS__BATCH_SIZE
        .add_source(
            config::Environment::with_prefix("LOG_PROCESSOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Manual overrides for values commonly set from deployment secrets
    if let Ok(brokers) = std::env::var("LOG_PROCESSOR_BROKERS") {
        config.broker.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(username) = std::env::var("LOG_PROCESSOR_SASL_USERNAME") {
        config.broker.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("LOG_PROCESSOR_SASL_PASSWORD") {
        config.broker.sasl_password = Some(password);
    }
    if let Ok(token) = std::env::var("LOG_PROCESSOR_AUTH_HEADER") {
        config.enrichment.auth_header = Some(token.clone());
        config.analytics.auth_header = Some(token);
    }

    Ok(config)
}

/// Check broker health on startup.
async fn check_health(config: &BrokerConfig) {
    if broker::health::check_connection(config).await {
        health().broker.set_healthy();
        info!("Redpanda connection: healthy");
    } else {
        health().broker.set_unhealthy("Connection failed");
        error!("Redpanda connection: unhealthy");
    }

    let missing = broker::health::verify_topics(config).await;
    if !missing.is_empty() {
        warn!(topics = ?missing, "Configured topics not found on the cluster");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
