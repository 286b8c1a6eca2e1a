//! Orchestrator module for the observation indexer.
//!
//! Coordinates the consumer, processor, and loader components.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::consumer::{Consumer, StreamMessage};
use crate::errors::IndexingError;
use crate::loader::ObservationLoader;
use crate::processor::ObservationProcessor;
use crate::telemetry::TraceContext;
use observation_repository::StoredLocation;
use observation_shared::IngestJob;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the message channel buffer.
    pub channel_buffer_size: usize,
    /// How often throughput is logged.
    pub progress_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 100,
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Lifecycle of one job inside the worker.
///
/// `Received -> Normalizing -> Indexing -> Acknowledged` on success,
/// `Received -> Normalizing -> Indexing -> Failed` when the write fails. A
/// failed job stays on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Normalizing,
    Indexing,
    Acknowledged,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Received => "received",
            JobState::Normalizing => "normalizing",
            JobState::Indexing => "indexing",
            JobState::Acknowledged => "acknowledged",
            JobState::Failed => "failed",
        }
    }
}

/// Orchestrator that coordinates the worker pipeline.
///
/// The orchestrator:
/// - Receives jobs from the consumer, one at a time
/// - Normalizes and indexes each job
/// - Acknowledges success or failure back to the consumer
/// - Handles shutdown signals and logs throughput
///
/// It never retries a job itself; redelivery is left to the queue.
pub struct Orchestrator {
    consumer: Arc<dyn Consumer>,
    processor: ObservationProcessor,
    loader: ObservationLoader,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
    /// Total number of jobs received since startup.
    total_jobs_received: Arc<AtomicU64>,
    /// Total number of documents indexed since startup.
    total_documents_indexed: Arc<AtomicU64>,
    /// Total number of jobs that failed since startup.
    total_jobs_failed: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given components.
    pub fn new(
        consumer: Arc<dyn Consumer>,
        processor: ObservationProcessor,
        loader: ObservationLoader,
    ) -> Self {
        Self::with_config(consumer, processor, loader, OrchestratorConfig::default())
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        consumer: Arc<dyn Consumer>,
        processor: ObservationProcessor,
        loader: ObservationLoader,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            consumer,
            processor,
            loader,
            config,
            shutdown_tx,
            total_jobs_received: Arc::new(AtomicU64::new(0)),
            total_documents_indexed: Arc::new(AtomicU64::new(0)),
            total_jobs_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Process one job: normalize it and index the result.
    ///
    /// Runs inside a `process_job` span linked to the trace carried by the
    /// job. Works the same when the job carries no trace context.
    ///
    /// # Returns
    ///
    /// * `Ok(StoredLocation)` - Where the document was written
    /// * `Err(IndexingError)` - The write failed; the job should not be acknowledged
    pub async fn handle(&self, job: &IngestJob) -> Result<StoredLocation, IndexingError> {
        let parent = TraceContext::extract(&job.trace_context);
        let context = parent
            .as_ref()
            .map(TraceContext::child_of)
            .unwrap_or_else(TraceContext::new_root);

        let span = info_span!(
            "process_job",
            trace_id = %context.trace_id,
            span_id = %context.span_id,
            parent_span_id = ?parent.as_ref().map(|p| p.span_id.as_str()),
            source = job.seed.source.as_str(),
        );

        async move {
            self.total_jobs_received.fetch_add(1, Ordering::Relaxed);
            record_state(JobState::Received);

            record_state(JobState::Normalizing);
            let doc = self.processor.process(job, Utc::now());

            record_state(JobState::Indexing);
            match self.loader.load(&doc).await {
                Ok(location) => {
                    self.total_documents_indexed.fetch_add(1, Ordering::Relaxed);
                    record_state(JobState::Acknowledged);
                    info!(location = %location, "Job indexed");
                    Ok(location)
                }
                Err(e) => {
                    self.total_jobs_failed.fetch_add(1, Ordering::Relaxed);
                    record_state(JobState::Failed);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the orchestrator.
    ///
    /// This method starts all pipeline components and coordinates message flow.
    /// It blocks until the stream ends, a shutdown signal is received or an
    /// error occurs.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), IndexingError> {
        info!("Starting observation indexer orchestrator");

        // Make sure index templates exist
        self.loader.check_ready().await?;

        // Subscribe to Kafka topics
        self.consumer.subscribe()?;

        // Create job channel
        let (job_transmitter, mut job_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);

        // Create acknowledgment channel
        let (ack_transmitter, ack_receiver) =
            mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);

        // Start consumer in background
        let consumer = self.consumer.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        let consumer_handle = tokio::spawn(async move {
            if let Err(e) = consumer.run(job_transmitter, ack_receiver, shutdown_rx).await {
                error!(error = %e, "Consumer error");
            }
        });

        info!("Ready to process jobs");

        let total_jobs = Arc::clone(&self.total_jobs_received);
        let total_docs = Arc::clone(&self.total_documents_indexed);
        let total_failed = Arc::clone(&self.total_jobs_failed);
        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Track previous values for rate calculation
        let mut prev_jobs: u64 = 0;
        let mut prev_docs: u64 = 0;
        let mut prev_time = std::time::Instant::now();

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                msg = job_receiver.recv() => {
                    match msg {
                        Some(StreamMessage::Job { job, offset }) => {
                            debug!(offset = ?offset, "Received job from consumer");
                            let ack = match self.handle(&job).await {
                                Ok(_) => StreamMessage::Acknowledgment {
                                    offset,
                                    success: true,
                                    error: None,
                                },
                                Err(e) => {
                                    error!(error = %e, "Failed to process job. Sending NACK to consumer");
                                    StreamMessage::Acknowledgment {
                                        offset,
                                        success: false,
                                        error: Some(e.to_string()),
                                    }
                                }
                            };
                            if ack_transmitter.send(ack).await.is_err() {
                                warn!("Consumer stopped before the acknowledgment was delivered");
                            }
                        }
                        Some(StreamMessage::Error(e)) => {
                            error!(error = %e, "Received error from consumer");
                        }
                        Some(StreamMessage::End) | None => {
                            info!("Consumer stream ended");
                            break;
                        }
                        Some(StreamMessage::Acknowledgment { .. }) => {
                            warn!("Received acknowledgment on job channel (should be on ack channel)");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = progress_timer.tick() => {
                    let jobs = total_jobs.load(Ordering::Relaxed);
                    let docs = total_docs.load(Ordering::Relaxed);
                    let failed = total_failed.load(Ordering::Relaxed);

                    // Calculate rates per second
                    let now = std::time::Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();

                    let jobs_per_sec = if elapsed_secs > 0.0 {
                        (jobs.saturating_sub(prev_jobs) as f64) / elapsed_secs
                    } else {
                        0.0
                    };

                    let docs_per_sec = if elapsed_secs > 0.0 {
                        (docs.saturating_sub(prev_docs) as f64) / elapsed_secs
                    } else {
                        0.0
                    };

                    info!(
                        jobs_received = jobs,
                        documents_indexed = docs,
                        jobs_failed = failed,
                        jobs_per_sec = format!("{:.2}", jobs_per_sec),
                        documents_per_sec = format!("{:.2}", docs_per_sec),
                        "Processing progress"
                    );

                    prev_jobs = jobs;
                    prev_docs = docs;
                    prev_time = now;
                }
            }
        }

        // Closing the ack channel stops a consumer that is waiting on a verdict.
        drop(ack_transmitter);
        let _ = consumer_handle.await;

        info!(
            total_jobs_received = self.total_jobs_received.load(Ordering::Relaxed),
            total_documents_indexed = self.total_documents_indexed.load(Ordering::Relaxed),
            total_jobs_failed = self.total_jobs_failed.load(Ordering::Relaxed),
            "Orchestrator shutdown complete"
        );
        Ok(())
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of documents indexed since startup.
    pub fn documents_indexed(&self) -> u64 {
        self.total_documents_indexed.load(Ordering::Relaxed)
    }

    /// Number of jobs whose write failed since startup.
    pub fn jobs_failed(&self) -> u64 {
        self.total_jobs_failed.load(Ordering::Relaxed)
    }
}

fn record_state(state: JobState) {
    match state {
        JobState::Failed => warn!(state = state.as_str(), "Job state transition"),
        _ => debug!(state = state.as_str(), "Job state transition"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_names() {
        let states = [
            JobState::Received,
            JobState::Normalizing,
            JobState::Indexing,
            JobState::Acknowledged,
            JobState::Failed,
        ];
        let names: Vec<&str> = states.iter().map(JobState::as_str).collect();
        assert_eq!(
            names,
            vec!["received", "normalizing", "indexing", "acknowledged", "failed"]
        );
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.channel_buffer_size, 100);
        assert_eq!(config.progress_interval, Duration::from_secs(10));
    }
}
