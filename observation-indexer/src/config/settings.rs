//! Process settings read from the environment.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::consumer::DEFAULT_INGEST_TOPIC;
use crate::upload::blob::{DEFAULT_BLOB_REGION, DEFAULT_BLOB_TIMEOUT_SECS};
use crate::upload::queue::DEFAULT_PRODUCER_TIMEOUT_MS;
use crate::upload::{HttpBlobConfig, ProducerConfig};
use observation_repository::{IndexLayout, OpenSearchSettings};

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default per-request OpenSearch timeout in seconds.
const DEFAULT_OPENSEARCH_TIMEOUT_SECS: u64 = 30;

/// Default Kafka broker address.
const DEFAULT_KAFKA_BROKER: &str = "localhost:9092";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "observation-indexer";

/// Client id used by the upload-side producer.
const PRODUCER_CLIENT_ID: &str = "observation-upload";

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Default pause before a failed job is redelivered.
const DEFAULT_REDELIVERY_DELAY_MS: u64 = 5000;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry the connection at a fixed interval until it succeeds.
    Retry,
}

impl ConnectionMode {
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("retry").to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            other => {
                warn!(value = other, "Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Everything the indexer process needs to start.
///
/// Built once at startup and passed into the components that need it.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub opensearch: OpenSearchSettings,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    pub layout: IndexLayout,
    pub kafka_broker: String,
    pub kafka_group_id: String,
    pub kafka_credentials: Option<(String, String)>,
    pub ingest_topic: String,
    pub kafka_timeout: Duration,
    pub redelivery_delay: Duration,
    /// Blob store for uploads; the upload side is disabled without it.
    pub blob: Option<HttpBlobConfig>,
}

impl IndexerSettings {
    /// Read settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_USERNAME` / `OPENSEARCH_PASSWORD`: basic auth (optional)
    /// - `OPENSEARCH_TIMEOUT_SECS`: per-request timeout (default: 30)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: retry interval in seconds (default: 15)
    /// - `IMAGES_DATA_STREAM`: observation data stream (default: hunt-trailcam)
    /// - `LEGACY_IMAGES_PATTERN`: legacy observation pattern, empty to disable (default: hunt-images-*)
    /// - `EVENTS_INDEX`: manual pin index (default: hunt-events)
    /// - `GEO_WAYPOINTS_INDEX` / `GEO_TRACKS_INDEX` / `GEO_AREAS_INDEX`: geometry indices
    /// - `KAFKA_BROKER`: Kafka broker address (default: localhost:9092)
    /// - `KAFKA_GROUP_ID`: consumer group ID (default: observation-indexer)
    /// - `KAFKA_USERNAME` / `KAFKA_PASSWORD`: SASL credentials (optional)
    /// - `INGEST_TOPIC`: topic carrying ingest jobs (default: observation.ingest)
    /// - `KAFKA_TIMEOUT_MS`: producer and metadata timeout (default: 5000)
    /// - `REDELIVERY_DELAY_MS`: pause before a failed job is read again (default: 5000)
    /// - `BLOB_ENDPOINT` / `BLOB_BUCKET`: blob store; both required to enable uploads
    /// - `BLOB_PUBLIC_URL`: public base URL for stored media (optional)
    /// - `BLOB_TIMEOUT_SECS`: blob request timeout (default: 30)
    /// - `BLOB_ACCESS_KEY` / `BLOB_SECRET_KEY`: signing credentials (optional)
    /// - `BLOB_REGION`: region in the signing scope (default: us-east-1)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let string_or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let number_or = |key: &str, default: u64| {
            var(key)
                .and_then(|v| match v.trim().parse::<u64>() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        warn!(key, value = %v, "Invalid number, using default");
                        None
                    }
                })
                .unwrap_or(default)
        };

        let mut opensearch = OpenSearchSettings::new(
            string_or("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            Duration::from_secs(number_or(
                "OPENSEARCH_TIMEOUT_SECS",
                DEFAULT_OPENSEARCH_TIMEOUT_SECS,
            )),
        );
        opensearch.username = var("OPENSEARCH_USERNAME");
        opensearch.password = var("OPENSEARCH_PASSWORD");

        let defaults = IndexLayout::default();
        // An explicitly empty pattern turns the legacy search off.
        let legacy_observation_pattern = match lookup("LEGACY_IMAGES_PATTERN") {
            Some(pattern) if pattern.trim().is_empty() => None,
            Some(pattern) => Some(pattern),
            None => defaults.legacy_observation_pattern.clone(),
        };
        let layout = IndexLayout {
            observations: string_or("IMAGES_DATA_STREAM", &defaults.observations),
            legacy_observation_pattern,
            events: string_or("EVENTS_INDEX", &defaults.events),
            waypoints: string_or("GEO_WAYPOINTS_INDEX", &defaults.waypoints),
            tracks: string_or("GEO_TRACKS_INDEX", &defaults.tracks),
            areas: string_or("GEO_AREAS_INDEX", &defaults.areas),
        };

        let blob = match (var("BLOB_ENDPOINT"), var("BLOB_BUCKET")) {
            (Some(endpoint), Some(bucket)) => {
                let mut config = HttpBlobConfig::new(endpoint, bucket)
                    .with_timeout(Duration::from_secs(number_or(
                        "BLOB_TIMEOUT_SECS",
                        DEFAULT_BLOB_TIMEOUT_SECS,
                    )))
                    .with_region(string_or("BLOB_REGION", DEFAULT_BLOB_REGION));
                if let Some(public) = var("BLOB_PUBLIC_URL") {
                    config = config.with_public_base_url(public);
                }
                if let Some((access_key, secret_key)) =
                    var("BLOB_ACCESS_KEY").zip(var("BLOB_SECRET_KEY"))
                {
                    config = config.with_credentials(access_key, secret_key);
                }
                Some(config)
            }
            _ => None,
        };

        Self {
            opensearch,
            connection_mode: ConnectionMode::parse(var("OPENSEARCH_CONNECTION_MODE").as_deref()),
            retry_interval: Duration::from_secs(number_or(
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
            layout,
            kafka_broker: string_or("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
            kafka_group_id: string_or("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            kafka_credentials: var("KAFKA_USERNAME").zip(var("KAFKA_PASSWORD")),
            ingest_topic: string_or("INGEST_TOPIC", DEFAULT_INGEST_TOPIC),
            kafka_timeout: Duration::from_millis(number_or(
                "KAFKA_TIMEOUT_MS",
                DEFAULT_PRODUCER_TIMEOUT_MS,
            )),
            redelivery_delay: Duration::from_millis(number_or(
                "REDELIVERY_DELAY_MS",
                DEFAULT_REDELIVERY_DELAY_MS,
            )),
            blob,
        }
    }

    /// Producer configuration for the upload side.
    pub fn producer_config(&self) -> ProducerConfig {
        let config = ProducerConfig::new(&self.kafka_broker, PRODUCER_CLIENT_ID)
            .with_topic(&self.ingest_topic)
            .with_timeout(self.kafka_timeout);
        match &self.kafka_credentials {
            Some((username, password)) => {
                config.with_credentials(username.clone(), password.clone())
            }
            None => config,
        }
    }
}
