//! Producer side of the ingestion queue.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::debug;

use crate::consumer::DEFAULT_INGEST_TOPIC;
use crate::errors::QueueError;
use observation_shared::IngestJob;

pub const DEFAULT_PRODUCER_TIMEOUT_MS: u64 = 5000;

/// Durable work queue the worker pipeline consumes from.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job and return its queue-assigned id.
    async fn enqueue(&self, job: &IngestJob) -> Result<String, QueueError>;

    /// Approximate number of jobs held by the queue.
    async fn depth(&self) -> Result<u64, QueueError>;
}

/// Configuration for [`KafkaJobQueue`].
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Kafka broker address (e.g., "localhost:9092")
    pub broker: String,
    pub client_id: String,
    pub topic: String,
    /// SASL username (enables SASL/SSL if set)
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl ProducerConfig {
    pub fn new(broker: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            client_id: client_id.into(),
            topic: DEFAULT_INGEST_TOPIC.to_string(),
            username: None,
            password: None,
            timeout: Duration::from_millis(DEFAULT_PRODUCER_TIMEOUT_MS),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Job queue backed by a Kafka topic.
///
/// Jobs are keyed by camera id so that uploads from one camera stay on
/// one partition.
pub struct KafkaJobQueue {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaJobQueue {
    pub fn new(config: &ProducerConfig) -> Result<Self, QueueError> {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &config.broker)
            .set("client.id", &config.client_id)
            .set("compression.type", "zstd")
            .set("message.timeout.ms", config.timeout.as_millis().to_string());

        // SASL/SSL for managed Kafka, plaintext for local development
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);
        }

        Ok(Self {
            producer: client_config.create()?,
            topic: config.topic.clone(),
            timeout: config.timeout,
        })
    }
}

/// Message headers carried alongside the JSON payload.
fn job_headers(job: &IngestJob) -> OwnedHeaders {
    job.trace_context
        .iter()
        .fold(OwnedHeaders::new(), |headers, (key, value)| {
            headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        })
}

fn job_id(topic: &str, partition: i32, offset: i64) -> String {
    format!("{}/{}/{}", topic, partition, offset)
}

#[async_trait]
impl JobQueue for KafkaJobQueue {
    async fn enqueue(&self, job: &IngestJob) -> Result<String, QueueError> {
        let payload = serde_json::to_vec(job)?;

        let mut record = FutureRecord::<str, [u8]>::to(&self.topic)
            .payload(payload.as_slice())
            .headers(job_headers(job));
        if let Some(camera_id) = job.seed.camera_id.as_deref() {
            record = record.key(camera_id);
        }

        let (partition, offset) = self
            .producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| QueueError::from(e))?;

        let id = job_id(&self.topic, partition, offset);
        debug!(job_id = %id, "Job enqueued");
        Ok(id)
    }

    /// Sum of high minus low watermarks over all partitions of the topic.
    ///
    /// Messages stay in the log after they are consumed, so this overstates
    /// the backlog; it is only an observability signal.
    async fn depth(&self) -> Result<u64, QueueError> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || -> Result<u64, QueueError> {
            let client = producer.client();
            let metadata = client.fetch_metadata(Some(topic.as_str()), timeout)?;
            let mut depth = 0u64;
            for t in metadata.topics().iter().filter(|t| t.name() == topic) {
                for partition in t.partitions() {
                    let (low, high) = client.fetch_watermarks(&topic, partition.id(), timeout)?;
                    depth += u64::try_from(high - low).unwrap_or(0);
                }
            }
            Ok(depth)
        })
        .await
        .map_err(|e| QueueError::kafka(format!("Watermark task failed: {}", e)))?
    }
}

/// In-memory job queue.
pub struct MockJobQueue {
    jobs: Mutex<Vec<IngestJob>>,
    fail_enqueue: bool,
    fail_depth: bool,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail_enqueue: false,
            fail_depth: false,
        }
    }

    /// A queue whose every `enqueue` fails.
    pub fn failing() -> Self {
        Self {
            fail_enqueue: true,
            ..Self::new()
        }
    }

    /// A queue that accepts jobs but cannot report its depth.
    pub fn without_depth() -> Self {
        Self {
            fail_depth: true,
            ..Self::new()
        }
    }

    pub fn jobs(&self) -> Vec<IngestJob> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn enqueue(&self, job: &IngestJob) -> Result<String, QueueError> {
        if self.fail_enqueue {
            return Err(QueueError::kafka("Message production error: queue full"));
        }
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.push(job.clone());
        Ok(job_id(DEFAULT_INGEST_TOPIC, 0, jobs.len() as i64 - 1))
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        if self.fail_depth {
            return Err(QueueError::kafka("Metadata request timed out"));
        }
        Ok(self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len() as u64)
    }
}
