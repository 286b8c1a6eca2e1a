//! Kafka consumer implementation for the observation indexer.
//!
//! Consumes JSON-encoded ingest jobs and forwards them to the orchestrator
//! one at a time.

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer as _, StreamConsumer},
    message::Message as KafkaMessage,
    Offset, TopicPartitionList,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::{Consumer, MessageOffset, StreamMessage};
use crate::errors::IndexingError;
use crate::telemetry::non_fatal;
use observation_shared::IngestJob;

/// The Kafka topic ingest jobs are published to.
pub const DEFAULT_INGEST_TOPIC: &str = "observation.ingest";

/// Pause before a failed job is read again.
const DEFAULT_REDELIVERY_DELAY_MS: u64 = 5000;

/// Default timeout for seek requests.
const DEFAULT_SEEK_TIMEOUT_MS: u64 = 5000;

/// Kafka consumer for ingest jobs.
///
/// Offsets are committed manually and only after the orchestrator
/// acknowledges the job. A failed job is not committed; the consumer seeks
/// its partition back so the same job is delivered again.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topics: Vec<String>,
    redelivery_delay: Duration,
    seek_timeout: Duration,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (comma-separated)
    /// * `group_id` - Consumer group ID
    /// * `topic` - Topic carrying ingest jobs
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaConsumer)` - A new consumer instance
    /// * `Err(IndexingError)` - If consumer creation fails
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, IndexingError> {
        Self::with_credentials(brokers, group_id, topic, None)
    }

    /// Create a consumer that authenticates with SASL/SSL when `credentials`
    /// (username, password) are given, and uses plaintext otherwise.
    pub fn with_credentials(
        brokers: &str,
        group_id: &str,
        topic: &str,
        credentials: Option<(&str, &str)>,
    ) -> Result<Self, IndexingError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000");
        if let Some((username, password)) = credentials {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .map_err(|e| IndexingError::kafka(e.to_string()))?;

        info!(
            brokers = %brokers,
            group_id = %group_id,
            topic = %topic,
            "Created Kafka consumer"
        );

        Ok(Self {
            consumer,
            topics: vec![topic.to_string()],
            redelivery_delay: Duration::from_millis(DEFAULT_REDELIVERY_DELAY_MS),
            seek_timeout: Duration::from_millis(DEFAULT_SEEK_TIMEOUT_MS),
        })
    }

    /// Set the pause before a failed job is read again.
    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Set the timeout for broker requests made by the consumer itself.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout = timeout;
        self
    }

    /// Commit the offset after `offset`, so the job is not read again.
    fn commit_offset(&self, offset: &MessageOffset) -> Result<(), IndexingError> {
        let (topic, partition, offset) = offset;
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, *partition, Offset::Offset(offset + 1))
            .map_err(|e| IndexingError::kafka(e.to_string()))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| IndexingError::kafka(e.to_string()))?;

        Ok(())
    }

    /// Move the partition back to `offset` so the job is delivered again.
    fn rewind(&self, offset: &MessageOffset) -> Result<(), IndexingError> {
        let (topic, partition, offset) = offset;
        self.consumer
            .seek(topic, *partition, Offset::Offset(*offset), self.seek_timeout)
            .map_err(|e| IndexingError::kafka(e.to_string()))
    }

    /// Wait for the orchestrator's verdict on one job and act on it.
    ///
    /// Returns `false` when the consumer should stop.
    async fn settle(
        &self,
        ack_receiver: &mut mpsc::Receiver<StreamMessage>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        let ack = tokio::select! {
            _ = shutdown.recv() => {
                info!("Consumer received shutdown signal while a job was in flight");
                return false;
            }
            ack = ack_receiver.recv() => ack,
        };

        match ack {
            Some(StreamMessage::Acknowledgment {
                offset,
                success: true,
                ..
            }) => {
                match self.commit_offset(&offset) {
                    Ok(()) => {
                        debug!(offset = ?offset, "Committed offset after successful processing")
                    }
                    Err(e) => error!(error = %e, "Failed to commit offset after acknowledgment"),
                }
                true
            }
            Some(StreamMessage::Acknowledgment {
                offset,
                success: false,
                error,
            }) => {
                warn!(
                    offset = ?offset,
                    error = error.as_deref().unwrap_or("Unknown error"),
                    redelivery_delay_ms = self.redelivery_delay.as_millis() as u64,
                    "Not committing offset due to processing failure; job will be redelivered"
                );
                tokio::select! {
                    _ = shutdown.recv() => return false,
                    _ = tokio::time::sleep(self.redelivery_delay) => {}
                }
                if let Err(e) = self.rewind(&offset) {
                    // Without a seek the job is only redelivered after a restart or rebalance.
                    error!(error = %e, "Failed to seek back to failed job");
                }
                true
            }
            Some(StreamMessage::End) | None => {
                info!("Acknowledgment channel closed");
                false
            }
            Some(_) => {
                warn!("Received unexpected message on acknowledgment channel");
                true
            }
        }
    }
}

#[async_trait]
impl Consumer for KafkaConsumer {
    /// Subscribe to configured topics.
    fn subscribe(&self) -> Result<(), IndexingError> {
        let topics: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer
            .subscribe(&topics)
            .map_err(|e| IndexingError::kafka(e.to_string()))?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    /// Start consuming jobs and send them through the channel.
    #[instrument(skip(self, sender, ack_receiver, shutdown))]
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut ack_receiver: mpsc::Receiver<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IndexingError> {
        use futures::StreamExt;

        let mut message_stream = self.consumer.stream();

        loop {
            let message = tokio::select! {
                _ = shutdown.recv() => {
                    info!("Consumer received shutdown signal");
                    // Uncommitted jobs are re-read from the last committed offset on restart
                    let _ = sender.send(StreamMessage::End).await;
                    break;
                }
                message = message_stream.next() => message,
            };

            let (offset, parsed) = match message {
                Some(Ok(msg)) => {
                    let offset: MessageOffset =
                        (msg.topic().to_string(), msg.partition(), msg.offset());
                    debug!(
                        topic = %offset.0,
                        partition = offset.1,
                        offset = offset.2,
                        "Received message from Kafka"
                    );
                    (offset, parse_job_payload(msg.payload()))
                }
                Some(Err(e)) => {
                    error!(error = %e, "Kafka error");
                    let _ = sender.send(StreamMessage::Error(e.to_string())).await;
                    continue;
                }
                None => {
                    info!("Kafka stream ended");
                    let _ = sender.send(StreamMessage::End).await;
                    break;
                }
            };

            match parsed {
                Ok(job) => {
                    sender
                        .send(StreamMessage::Job {
                            job,
                            offset: offset.clone(),
                        })
                        .await
                        .map_err(|e| IndexingError::ChannelError(e.to_string()))?;

                    if !self.settle(&mut ack_receiver, &mut shutdown).await {
                        let _ = sender.send(StreamMessage::End).await;
                        break;
                    }
                }
                Err(e) => {
                    skip_unparseable(&offset, &e, |offset| self.commit_offset(offset));
                }
            }
        }

        Ok(())
    }
}

/// Commit past a payload that can never decode.
///
/// A failed commit does not stop the consumer: the message is skipped again
/// the next time it is read. Returns whether the commit went through.
fn skip_unparseable(
    offset: &MessageOffset,
    error: &IndexingError,
    commit: impl FnOnce(&MessageOffset) -> Result<(), IndexingError>,
) -> bool {
    error!(
        topic = %offset.0,
        partition = offset.1,
        offset = offset.2,
        error = %error,
        "Failed to parse ingest job; committing past it"
    );
    non_fatal("commit_unparseable", commit(offset)).is_some()
}

/// Decode one message payload into an ingest job.
pub fn parse_job_payload(payload: Option<&[u8]>) -> Result<IngestJob, IndexingError> {
    let payload = match payload {
        Some(p) if !p.is_empty() => p,
        _ => return Err(IndexingError::parse("Received message with empty payload")),
    };

    serde_json::from_slice(payload)
        .map_err(|e| IndexingError::parse(format!("Failed to decode IngestJob: {}", e)))
}
