//! Observation search service implementation.
//!
//! This module provides the main service for writing canonical documents and
//! querying observations. Application code uses this rather than a store
//! directly.

use observation_shared::{CanonicalGeometry, CanonicalObservation, NormalizedHit, ObservationQuery};
use tracing::debug;

use crate::config::ObservationSearchServiceConfig;
use crate::errors::ObservationStoreError;
use crate::interfaces::ObservationStore;
use crate::types::StoredLocation;

/// The main service for interacting with the observation store.
///
/// This is the high-level API that application code should use. It validates
/// input, enforces batch and result limits, and delegates to an
/// `ObservationStore` for the backend operations.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use observation_repository::{ObservationSearchService, IndexLayout, OpenSearchProvider, OpenSearchSettings};
/// use observation_shared::ObservationQuery;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = OpenSearchSettings::new("http://localhost:9200", Duration::from_secs(10));
/// let provider = Box::new(OpenSearchProvider::new(settings, IndexLayout::default()).await?);
/// let service = ObservationSearchService::new(provider);
///
/// let hits = service
///     .query_observations(ObservationQuery::new(20).with_text("deer").with_bbox_str("-94,44,-93,45"))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ObservationSearchService {
    store: Box<dyn ObservationStore>,
    config: ObservationSearchServiceConfig,
}

impl ObservationSearchService {
    /// Create a new service with default configuration.
    ///
    /// The default configuration allows 1000 documents per bulk write.
    ///
    /// # Arguments
    ///
    /// * `store` - A boxed implementation of `ObservationStore` (e.g., `OpenSearchProvider`)
    pub fn new(store: Box<dyn ObservationStore>) -> Self {
        Self {
            store,
            config: ObservationSearchServiceConfig::default(),
        }
    }

    /// Create a new service with custom configuration.
    ///
    /// # Arguments
    ///
    /// * `store` - A boxed implementation of `ObservationStore`
    /// * `config` - Custom configuration for the service
    pub fn with_config(
        store: Box<dyn ObservationStore>,
        config: ObservationSearchServiceConfig,
    ) -> Self {
        Self { store, config }
    }

    /// Check if batch size exceeds the configured limit.
    fn validate_batch_size(&self, size: usize) -> Result<(), ObservationStoreError> {
        if let Some(max) = self.config.max_batch_size {
            if size > max {
                return Err(ObservationStoreError::batch_size_exceeded(size, max));
            }
        }
        Ok(())
    }

    /// Largest bulk write this service accepts, if limited.
    pub fn max_batch_size(&self) -> Option<usize> {
        self.config.max_batch_size
    }

    /// Ensure templates and indices exist. Call once at startup.
    pub async fn ensure_indices(&self) -> Result<(), ObservationStoreError> {
        self.store.ensure_indices().await
    }

    /// Index one observation.
    ///
    /// Every call stores a new document; identical input stored twice yields
    /// two documents.
    pub async fn index_observation(
        &self,
        doc: &CanonicalObservation,
    ) -> Result<StoredLocation, ObservationStoreError> {
        self.store.index_observation(doc).await
    }

    /// Index one geometry.
    pub async fn index_geometry(
        &self,
        doc: &CanonicalGeometry,
    ) -> Result<StoredLocation, ObservationStoreError> {
        self.store.index_geometry(doc).await
    }

    /// Index a batch of geometries in a single bulk write.
    ///
    /// Batches over [`max_batch_size`](Self::max_batch_size) are refused, so
    /// callers split large files before calling this.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<StoredLocation>)` - One location per document, in input order
    /// * `Err(ObservationStoreError::ValidationError)` - If the batch is empty
    /// * `Err(ObservationStoreError::BatchSizeExceeded)` - If the batch is too large
    /// * `Err(ObservationStoreError::BulkIndexError)` - If any document failed
    pub async fn bulk_index_geometries(
        &self,
        docs: &[CanonicalGeometry],
    ) -> Result<Vec<StoredLocation>, ObservationStoreError> {
        if docs.is_empty() {
            return Err(ObservationStoreError::validation(
                "Bulk write requires at least one document",
            ));
        }
        self.validate_batch_size(docs.len())?;
        self.store.bulk_index_geometries(docs).await
    }

    /// Query observations by text, time range and bounding box.
    ///
    /// The limit must be positive and is capped at `max_query_limit`. Hits are
    /// checked against the requested time range once more after the backend
    /// returns them; a hit outside the range, or without a readable timestamp
    /// when a range was requested, is dropped. The remaining hits are ordered
    /// newest first by their resolved timestamp, whichever field it came from,
    /// with undated hits last.
    ///
    /// # Arguments
    ///
    /// * `query` - The query parameters
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<NormalizedHit>)` - Hits, newest first
    /// * `Err(ObservationStoreError::ValidationError)` - If the limit is zero
    /// * `Err(ObservationStoreError)` - If the backend call fails
    pub async fn query_observations(
        &self,
        mut query: ObservationQuery,
    ) -> Result<Vec<NormalizedHit>, ObservationStoreError> {
        if query.limit == 0 {
            return Err(ObservationStoreError::validation(
                "limit must be greater than zero",
            ));
        }
        query.limit = query.limit.min(self.config.max_query_limit);

        let hits = self.store.query_observations(&query).await?;
        let returned = hits.len();

        let mut hits: Vec<NormalizedHit> = match &query.time_range {
            Some(range) => hits
                .into_iter()
                .filter(|hit| hit.timestamp.is_some_and(|ts| range.contains(&ts)))
                .collect(),
            None => hits,
        };

        if hits.len() != returned {
            debug!(
                dropped = returned - hits.len(),
                "Dropped hits outside the requested time range"
            );
        }

        // the backend sorts one timestamp field at a time
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(hits.into_iter().take(query.limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use observation_shared::{Geometry, GeometrySource, TimeRange};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Mock store for testing
    struct MockStore {
        hits: Vec<NormalizedHit>,
        queries: Arc<Mutex<Vec<ObservationQuery>>>,
        bulk_sizes: Arc<Mutex<Vec<usize>>>,
        should_fail: bool,
    }

    impl MockStore {
        fn new(hits: Vec<NormalizedHit>) -> Self {
            Self {
                hits,
                queries: Arc::new(Mutex::new(Vec::new())),
                bulk_sizes: Arc::new(Mutex::new(Vec::new())),
                should_fail: false,
            }
        }
    }

    #[async_trait]
    impl ObservationStore for MockStore {
        async fn ensure_indices(&self) -> Result<(), ObservationStoreError> {
            Ok(())
        }

        async fn index_observation(
            &self,
            _doc: &CanonicalObservation,
        ) -> Result<StoredLocation, ObservationStoreError> {
            if self.should_fail {
                return Err(ObservationStoreError::index("Mock failure"));
            }
            Ok(StoredLocation::new("hunt-trailcam", "1"))
        }

        async fn index_geometry(
            &self,
            _doc: &CanonicalGeometry,
        ) -> Result<StoredLocation, ObservationStoreError> {
            Ok(StoredLocation::new("hunt-geo-waypoints", "1"))
        }

        async fn bulk_index_geometries(
            &self,
            docs: &[CanonicalGeometry],
        ) -> Result<Vec<StoredLocation>, ObservationStoreError> {
            if self.should_fail {
                return Err(ObservationStoreError::bulk_index("Mock failure"));
            }
            self.bulk_sizes.lock().await.push(docs.len());
            Ok(docs
                .iter()
                .enumerate()
                .map(|(i, _)| StoredLocation::new("hunt-geo-tracks", i.to_string()))
                .collect())
        }

        async fn query_observations(
            &self,
            query: &ObservationQuery,
        ) -> Result<Vec<NormalizedHit>, ObservationStoreError> {
            self.queries.lock().await.push(query.clone());
            Ok(self.hits.clone())
        }
    }

    fn hit_at(id: &str, ts: Option<DateTime<Utc>>) -> NormalizedHit {
        let mut hit = NormalizedHit::new(id, "hunt-trailcam");
        hit.timestamp = ts;
        hit
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, d, 12, 0, 0).unwrap()
    }

    fn line() -> CanonicalGeometry {
        CanonicalGeometry::new(
            GeometrySource::Gpx,
            Geometry::LineString(vec![[0.0, 0.0], [1.0, 1.0]]),
        )
    }

    #[tokio::test]
    async fn test_query_rejects_zero_limit() {
        let service = ObservationSearchService::new(Box::new(MockStore::new(vec![])));
        let mut query = ObservationQuery::new(10);
        query.limit = 0;

        let result = service.query_observations(query).await;
        assert!(matches!(result, Err(ObservationStoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_query_caps_limit() {
        let store = MockStore::new(vec![]);
        let queries = store.queries.clone();
        let config = ObservationSearchServiceConfig {
            max_query_limit: 25,
            ..Default::default()
        };
        let service = ObservationSearchService::with_config(Box::new(store), config);

        service
            .query_observations(ObservationQuery::new(100))
            .await
            .unwrap();
        assert_eq!(queries.lock().await[0].limit, 25);
    }

    #[tokio::test]
    async fn test_query_drops_hits_outside_time_range() {
        let store = MockStore::new(vec![
            hit_at("before", Some(day(1))),
            hit_at("start", Some(day(5))),
            hit_at("inside", Some(day(7))),
            hit_at("end", Some(day(10))),
            hit_at("after", Some(day(20))),
            hit_at("no-ts", None),
        ]);
        let service = ObservationSearchService::new(Box::new(store));
        let query = ObservationQuery::new(50)
            .with_time_range(TimeRange::new(Some(day(5)), Some(day(10))));

        let hits = service.query_observations(query).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["end", "inside", "start"]);
    }

    #[tokio::test]
    async fn test_query_without_range_keeps_everything() {
        let store = MockStore::new(vec![hit_at("a", None), hit_at("b", Some(day(3)))]);
        let service = ObservationSearchService::new(Box::new(store));

        let hits = service
            .query_observations(ObservationQuery::new(50))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_query_orders_mixed_layouts_newest_first() {
        // the backend returns current-layout hits ahead of older-layout ones
        let store = MockStore::new(vec![
            hit_at("current-old", Some(day(2))),
            hit_at("current-new", Some(day(9))),
            hit_at("legacy-newest", Some(day(12))),
            hit_at("legacy-undated", None),
            hit_at("legacy-mid", Some(day(5))),
        ]);
        let service = ObservationSearchService::new(Box::new(store));

        let hits = service
            .query_observations(ObservationQuery::new(4))
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["legacy-newest", "current-new", "legacy-mid", "current-old"]
        );
    }

    #[tokio::test]
    async fn test_malformed_bbox_matches_no_bbox() {
        let store = MockStore::new(vec![hit_at("a", Some(day(3)))]);
        let queries = store.queries.clone();
        let service = ObservationSearchService::new(Box::new(store));

        let with_bad = service
            .query_observations(ObservationQuery::new(10).with_bbox_str("abc"))
            .await
            .unwrap();
        let without = service
            .query_observations(ObservationQuery::new(10))
            .await
            .unwrap();

        assert_eq!(with_bad, without);
        let recorded = queries.lock().await;
        assert_eq!(recorded[0], recorded[1]);
    }

    #[tokio::test]
    async fn test_bulk_rejects_empty_batch() {
        let service = ObservationSearchService::new(Box::new(MockStore::new(vec![])));
        let result = service.bulk_index_geometries(&[]).await;
        assert!(matches!(result, Err(ObservationStoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_bulk_enforces_batch_size() {
        let store = MockStore::new(vec![]);
        let bulk_sizes = store.bulk_sizes.clone();
        let service = ObservationSearchService::with_config(
            Box::new(store),
            ObservationSearchServiceConfig::with_max_batch_size(2),
        );
        assert_eq!(service.max_batch_size(), Some(2));

        let result = service.bulk_index_geometries(&[line(), line(), line()]).await;
        assert!(matches!(
            result,
            Err(ObservationStoreError::BatchSizeExceeded { provided: 3, max: 2 })
        ));
        assert!(bulk_sizes.lock().await.is_empty());

        let locations = service.bulk_index_geometries(&[line(), line()]).await.unwrap();
        assert_eq!(locations.len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_size_unlimited() {
        let service = ObservationSearchService::with_config(
            Box::new(MockStore::new(vec![])),
            ObservationSearchServiceConfig::unlimited(),
        );
        let docs: Vec<CanonicalGeometry> = (0..5000).map(|_| line()).collect();

        let result = service.bulk_index_geometries(&docs).await;
        assert_eq!(result.unwrap().len(), 5000);
    }

    #[tokio::test]
    async fn test_index_failure_is_surfaced() {
        let mut store = MockStore::new(vec![]);
        store.should_fail = true;
        let service = ObservationSearchService::new(Box::new(store));
        let doc = CanonicalObservation::new(
            observation_shared::SourceKind::TrailcamImage,
            day(1),
            day(1),
        );

        let result = service.index_observation(&doc).await;
        assert!(matches!(result, Err(ObservationStoreError::IndexError(_))));
    }
}
