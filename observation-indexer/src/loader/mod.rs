//! Loader module for the observation indexer.
//!
//! Writes canonical documents through the search service.

use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::errors::IndexingError;

/// Geometries written per bulk request.
pub const GEOMETRY_BATCH_SIZE: usize = 500;
use observation_repository::{ObservationSearchService, StoredLocation};
use observation_shared::{CanonicalGeometry, CanonicalObservation};

/// Loader that indexes canonical documents into the search backend.
///
/// Writes are not retried here. A failed write is returned to the caller so
/// the job stays on the queue for redelivery.
#[derive(Clone)]
pub struct ObservationLoader {
    service: Arc<ObservationSearchService>,
}

impl ObservationLoader {
    /// Create a new loader on top of the given service.
    pub fn new(service: Arc<ObservationSearchService>) -> Self {
        Self { service }
    }

    /// Index one observation.
    ///
    /// The backend assigns the document id, so loading the same observation
    /// twice stores two documents.
    #[instrument(skip(self, doc), fields(source = doc.source.as_str()))]
    pub async fn load(&self, doc: &CanonicalObservation) -> Result<StoredLocation, IndexingError> {
        match self.service.index_observation(doc).await {
            Ok(location) => {
                debug!(location = %location, "Indexed observation");
                Ok(location)
            }
            Err(e) => {
                error!(error = %e, "Failed to index observation");
                Err(IndexingError::loader(format!(
                    "Failed to index observation: {}",
                    e
                )))
            }
        }
    }

    /// Index all geometries from one file.
    ///
    /// Documents go out in bulk requests of at most [`GEOMETRY_BATCH_SIZE`]
    /// (or the service's batch limit, if lower), in input order. The first
    /// failing request stops the load; requests before it stay written.
    #[instrument(skip(self, docs), fields(count = docs.len()))]
    pub async fn load_geometries(
        &self,
        docs: &[CanonicalGeometry],
    ) -> Result<Vec<StoredLocation>, IndexingError> {
        let batch_size = self
            .service
            .max_batch_size()
            .map_or(GEOMETRY_BATCH_SIZE, |max| max.min(GEOMETRY_BATCH_SIZE))
            .max(1);

        let mut locations = Vec::with_capacity(docs.len());
        for (n, batch) in docs.chunks(batch_size).enumerate() {
            let stored = self.service.bulk_index_geometries(batch).await.map_err(|e| {
                error!(
                    error = %e,
                    batch = n,
                    count = batch.len(),
                    "Failed to bulk index geometries"
                );
                IndexingError::loader(format!(
                    "Failed to bulk index {} geometries (batch {} of {} documents): {}",
                    docs.len(),
                    n + 1,
                    batch.len(),
                    e
                ))
            })?;
            debug!(batch = n, count = stored.len(), "Indexed geometry batch");
            locations.extend(stored);
        }
        Ok(locations)
    }

    /// Make sure index templates exist before any write.
    pub async fn check_ready(&self) -> Result<(), IndexingError> {
        self.service
            .ensure_indices()
            .await
            .map_err(|e| IndexingError::config(format!("Failed to ensure indices: {}", e)))
    }
}
