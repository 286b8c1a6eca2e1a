//! Observation store trait definition.
//!
//! This module defines the abstract interface for persisting canonical
//! documents and querying observations, independent of the backend.

use async_trait::async_trait;
use observation_shared::{CanonicalGeometry, CanonicalObservation, NormalizedHit, ObservationQuery};

use crate::errors::ObservationStoreError;
use crate::types::StoredLocation;

/// Abstracts the underlying search backend (OpenSearch, Elasticsearch, ...).
///
/// Each capability has exactly one method. The backend is chosen once when the
/// store is constructed; nothing probes for alternative method names at call
/// time. Implementations are injected into `ObservationSearchService`, which
/// makes testing with mock stores straightforward.
///
/// # Identity
///
/// Documents are written with server-assigned ids. Writing the same document
/// twice stores two documents.
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Ensure templates and indices exist, creating them if necessary.
    ///
    /// Called once during application startup.
    async fn ensure_indices(&self) -> Result<(), ObservationStoreError>;

    /// Index one canonical observation.
    ///
    /// # Returns
    ///
    /// * `Ok(StoredLocation)` - Index and id the backend assigned
    /// * `Err(ObservationStoreError)` - If the write fails
    async fn index_observation(
        &self,
        doc: &CanonicalObservation,
    ) -> Result<StoredLocation, ObservationStoreError>;

    /// Index one canonical geometry.
    async fn index_geometry(
        &self,
        doc: &CanonicalGeometry,
    ) -> Result<StoredLocation, ObservationStoreError>;

    /// Index several geometries in a single bulk request.
    ///
    /// Any item failure is reported as one aggregate `BulkIndexError`; there is
    /// no per-item partial success tracking.
    async fn bulk_index_geometries(
        &self,
        docs: &[CanonicalGeometry],
    ) -> Result<Vec<StoredLocation>, ObservationStoreError>;

    /// Search observations across every known index layout.
    ///
    /// Hits come back newest first, already normalized.
    async fn query_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<NormalizedHit>, ObservationStoreError>;
}
