//! Dependency initialization and wiring for the observation indexer.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{ConnectionMode, IndexerSettings};
use crate::consumer::KafkaConsumer;
use crate::geometry::GeometryIngestor;
use crate::loader::ObservationLoader;
use crate::orchestrator::Orchestrator;
use crate::processor::ObservationProcessor;
use crate::upload::{HttpBlobStore, KafkaJobQueue, UploadService};
use crate::IndexingError;
use observation_repository::{
    IndexLayout, ObservationSearchService, OpenSearchProvider, OpenSearchSettings,
};

/// Container for all initialized dependencies.
///
/// One search client is built here and shared by the worker pipeline, the
/// geometry ingestor and any caller of [`Dependencies::search`].
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
    pub geometry: GeometryIngestor,
    pub search: Arc<ObservationSearchService>,
    /// Present when a blob store is configured.
    pub upload: Option<UploadService>,
}

impl Dependencies {
    /// Initialize all dependencies from the given settings.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails (OpenSearch only in fail-fast mode)
    pub async fn new(settings: &IndexerSettings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch.url,
            kafka_broker = %settings.kafka_broker,
            kafka_group_id = %settings.kafka_group_id,
            ingest_topic = %settings.ingest_topic,
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.retry_interval.as_secs(),
            "Initializing dependencies"
        );

        let provider = Self::connect_to_opensearch(
            &settings.opensearch,
            &settings.layout,
            settings.connection_mode,
            settings.retry_interval,
        )
        .await?;

        info!("OpenSearch connection established");

        let search = Arc::new(ObservationSearchService::new(Box::new(provider)));
        let loader = ObservationLoader::new(search.clone());

        let credentials = settings
            .kafka_credentials
            .as_ref()
            .map(|(user, pass)| (user.as_str(), pass.as_str()));
        let consumer = KafkaConsumer::with_credentials(
            &settings.kafka_broker,
            &settings.kafka_group_id,
            &settings.ingest_topic,
            credentials,
        )
        .map_err(|e| IndexingError::config(format!("Failed to create Kafka consumer: {}", e)))?
        .with_redelivery_delay(settings.redelivery_delay)
        .with_request_timeout(settings.kafka_timeout);

        info!("Kafka consumer created");

        let upload = match &settings.blob {
            Some(blob_config) => {
                let blobs = HttpBlobStore::new(blob_config.clone()).map_err(|e| {
                    IndexingError::config(format!("Failed to create blob store: {}", e))
                })?;
                let queue = KafkaJobQueue::new(&settings.producer_config()).map_err(|e| {
                    IndexingError::config(format!("Failed to create Kafka producer: {}", e))
                })?;
                info!(
                    bucket = %blob_config.bucket,
                    signed = blob_config.credentials.is_some(),
                    "Upload service enabled"
                );
                Some(UploadService::new(Arc::new(blobs), Arc::new(queue)))
            }
            None => None,
        };

        let orchestrator = Orchestrator::new(
            Arc::new(consumer),
            ObservationProcessor::new(),
            loader.clone(),
        );

        Ok(Self {
            orchestrator,
            geometry: GeometryIngestor::new(loader),
            search,
            upload,
        })
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        settings: &OpenSearchSettings,
        layout: &IndexLayout,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, IndexingError> {
        loop {
            match OpenSearchProvider::new(settings.clone(), layout.clone()).await {
                Ok(provider) => return Ok(provider),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %settings.url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }
}
