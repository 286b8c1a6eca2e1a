//! Observation processor implementation.
//!
//! Wraps the normalizer with per-job logging.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::processor::normalizer;
use observation_shared::{CanonicalObservation, IngestJob};

/// Processor that turns ingest jobs into canonical observations.
///
/// Holds no state; normalization is a pure function of the job and the
/// processing time.
#[derive(Debug, Default)]
pub struct ObservationProcessor {}

impl ObservationProcessor {
    /// Create a new observation processor.
    pub fn new() -> Self {
        Self {}
    }

    /// Normalize one job.
    ///
    /// # Arguments
    ///
    /// * `job` - The dequeued job
    /// * `now` - Processing time, recorded as `ingest_timestamp`
    ///
    /// # Returns
    ///
    /// The canonical document. Normalization cannot fail: absent or malformed
    /// fields are left out.
    #[instrument(skip(self, job), fields(source = job.seed.source.as_str()))]
    pub fn process(&self, job: &IngestJob, now: DateTime<Utc>) -> CanonicalObservation {
        let doc = normalizer::normalize(&job.seed, job.enqueued_at, now);

        debug!(
            timestamp = %doc.timestamp,
            has_location = doc.location.is_some(),
            has_heading = doc.heading.is_some(),
            label_count = doc.labels.len(),
            "Normalized observation"
        );

        doc
    }
}
