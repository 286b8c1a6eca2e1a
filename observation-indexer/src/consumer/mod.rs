//! Consumer module for the observation indexer.
//!
//! Provides the queue-facing side of the worker pipeline.

mod kafka_consumer;

pub use kafka_consumer::{parse_job_payload, KafkaConsumer, DEFAULT_INGEST_TOPIC};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::errors::IndexingError;
use observation_shared::IngestJob;

/// Position of one message in the queue: `(topic, partition, offset)`.
pub type MessageOffset = (String, i32, i64);

/// Messages that flow between the consumer and the orchestrator.
#[derive(Debug)]
pub enum StreamMessage {
    /// One dequeued job and where it came from.
    Job { job: IngestJob, offset: MessageOffset },
    /// Outcome of processing the job at `offset`.
    Acknowledgment {
        offset: MessageOffset,
        success: bool,
        error: Option<String>,
    },
    /// Stream has ended.
    End,
    /// Error from the queue client.
    Error(String),
}

/// Source of ingest jobs.
///
/// Implementations send at most one `Job` at a time and wait for its
/// `Acknowledgment` on `ack_receiver` before reading the next message. A
/// successful ack commits the job; a failed one leaves it for redelivery.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Subscribe to the configured topics.
    fn subscribe(&self) -> Result<(), IndexingError>;

    /// Consume until the stream ends, the ack channel closes or `shutdown` fires.
    async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        ack_receiver: mpsc::Receiver<StreamMessage>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), IndexingError>;
}
