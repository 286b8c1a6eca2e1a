//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `ObservationStore`
//! using the OpenSearch Rust crate.

use std::time::Duration;

use async_trait::async_trait;
use observation_shared::{CanonicalGeometry, CanonicalObservation, NormalizedHit, ObservationQuery};
use opensearch::{
    auth::Credentials,
    http::{
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{IndicesExistsIndexTemplateParts, IndicesPutIndexTemplateParts},
    BulkOperation, BulkOperations, BulkParts, IndexParts, OpenSearch, SearchParts,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::ObservationStoreError;
use crate::interfaces::ObservationStore;
use crate::opensearch::field_lookup::{normalize_hit, FieldLookup};
use crate::opensearch::index_config::IndexLayout;
use crate::opensearch::query_builder::build_search_body;
use crate::types::StoredLocation;

/// Connection settings for the OpenSearch provider.
#[derive(Debug, Clone)]
pub struct OpenSearchSettings {
    /// Server URL, e.g. `http://localhost:9200`.
    pub url: String,
    /// Optional basic-auth credentials.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Timeout applied to every request.
    pub request_timeout: Duration,
}

impl OpenSearchSettings {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            request_timeout,
        }
    }
}

/// OpenSearch provider implementation.
///
/// One client is built at construction and shared by every call.
///
/// # Example
///
/// ```ignore
/// use observation_repository::opensearch::{IndexLayout, OpenSearchSettings};
/// let settings = OpenSearchSettings::new("http://localhost:9200", Duration::from_secs(10));
/// let provider = OpenSearchProvider::new(settings, IndexLayout::default()).await?;
///
/// let location = provider.index_observation(&doc).await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    layout: IndexLayout,
    fields: FieldLookup,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the configured URL.
    ///
    /// # Arguments
    ///
    /// * `settings` - URL, credentials and per-request timeout
    /// * `layout` - Index names to read and write
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(ObservationStoreError)` - If connection setup fails
    pub async fn new(
        settings: OpenSearchSettings,
        layout: IndexLayout,
    ) -> Result<Self, ObservationStoreError> {
        let parsed_url = Url::parse(&settings.url)
            .map_err(|e| ObservationStoreError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(settings.request_timeout)
            .disable_proxy();
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
        }
        let transport = builder
            .build()
            .map_err(|e| ObservationStoreError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %settings.url,
            observations = %layout.observations,
            timeout_ms = settings.request_timeout.as_millis() as u64,
            "Created OpenSearch provider"
        );

        Ok(Self {
            client,
            layout,
            fields: FieldLookup::default(),
        })
    }

    /// Read a failed response body for the error message.
    async fn failure_body(response: Response) -> String {
        response.text().await.unwrap_or_default()
    }

    /// Index a single JSON document, letting the server assign the id.
    async fn index_document(
        &self,
        index: &str,
        body: Value,
    ) -> Result<StoredLocation, ObservationStoreError> {
        let response = self
            .client
            .index(IndexParts::Index(index))
            .body(body)
            .send()
            .await
            .map_err(|e| ObservationStoreError::index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::failure_body(response).await;
            error!(status = %status, index = %index, body = %error_body, "Index request failed");
            return Err(ObservationStoreError::index(format!(
                "Index into {} failed with status {}: {}",
                index, status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ObservationStoreError::parse(e.to_string()))?;
        let location = Self::stored_location(&body, index)?;

        debug!(index = %location.index, id = %location.id, "Document indexed");
        Ok(location)
    }

    /// Extract `_index` / `_id` from an index or bulk item response.
    fn stored_location(
        body: &Value,
        fallback_index: &str,
    ) -> Result<StoredLocation, ObservationStoreError> {
        let id = body
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ObservationStoreError::parse("Response has no _id"))?;
        let index = body
            .get("_index")
            .and_then(Value::as_str)
            .unwrap_or(fallback_index);
        Ok(StoredLocation::new(index, id))
    }

    /// Turn a bulk response into stored locations, or one aggregate error.
    fn bulk_locations(
        body: &Value,
        expected: usize,
    ) -> Result<Vec<StoredLocation>, ObservationStoreError> {
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| ObservationStoreError::parse("Bulk response has no items"))?;

        let mut locations = Vec::with_capacity(items.len());
        let mut failures = Vec::new();
        for item in items {
            // each item is {"index": {...}} for our index actions
            let result = item
                .get("index")
                .or_else(|| item.get("create"))
                .unwrap_or(item);
            match result.get("error") {
                Some(err) if !err.is_null() => failures.push(
                    err.get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                ),
                _ => locations.push(Self::stored_location(result, "")?),
            }
        }

        if !failures.is_empty() {
            return Err(ObservationStoreError::bulk_index(format!(
                "{} of {} documents failed; first error: {}",
                failures.len(),
                expected,
                failures[0]
            )));
        }
        if locations.len() != expected {
            return Err(ObservationStoreError::bulk_index(format!(
                "Bulk response has {} items for {} documents",
                locations.len(),
                expected
            )));
        }
        Ok(locations)
    }

    /// Install one index template unless it already exists.
    async fn ensure_template(&self, name: &str, body: Value) -> Result<(), ObservationStoreError> {
        let exists = self
            .client
            .indices()
            .exists_index_template(IndicesExistsIndexTemplateParts::Name(name))
            .send()
            .await
            .map_err(|e| ObservationStoreError::index_creation(e.to_string()))?;

        if exists.status_code().is_success() {
            debug!(template = %name, "Index template already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .put_index_template(IndicesPutIndexTemplateParts::Name(name))
            .body(body)
            .send()
            .await
            .map_err(|e| ObservationStoreError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::failure_body(response).await;
            error!(status = %status, template = %name, body = %error_body, "Template creation failed");
            return Err(ObservationStoreError::index_creation(format!(
                "Template {} failed with status {}: {}",
                name, status, error_body
            )));
        }

        info!(template = %name, "Created index template");
        Ok(())
    }
}

#[async_trait]
impl ObservationStore for OpenSearchProvider {
    async fn ensure_indices(&self) -> Result<(), ObservationStoreError> {
        for template in self.layout.templates() {
            self.ensure_template(&template.name, template.body).await?;
        }
        Ok(())
    }

    /// Index a canonical observation into the index for its source kind.
    async fn index_observation(
        &self,
        doc: &CanonicalObservation,
    ) -> Result<StoredLocation, ObservationStoreError> {
        let body = serde_json::to_value(doc)
            .map_err(|e| ObservationStoreError::serialization(e.to_string()))?;
        self.index_document(self.layout.index_for_source(doc.source), body)
            .await
    }

    async fn index_geometry(
        &self,
        doc: &CanonicalGeometry,
    ) -> Result<StoredLocation, ObservationStoreError> {
        let body = serde_json::to_value(doc)
            .map_err(|e| ObservationStoreError::serialization(e.to_string()))?;
        self.index_document(self.layout.index_for_geometry(doc.kind()), body)
            .await
    }

    /// Index geometries with one `_bulk` request, routing each by kind.
    ///
    /// Any item-level failure turns into a single `BulkIndexError`.
    async fn bulk_index_geometries(
        &self,
        docs: &[CanonicalGeometry],
    ) -> Result<Vec<StoredLocation>, ObservationStoreError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut ops = BulkOperations::new();
        for doc in docs {
            let source = serde_json::to_value(doc)
                .map_err(|e| ObservationStoreError::serialization(e.to_string()))?;
            ops.push(
                BulkOperation::index(source).index(self.layout.index_for_geometry(doc.kind())),
            )
            .map_err(|e| ObservationStoreError::serialization(e.to_string()))?;
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(vec![ops])
            .send()
            .await
            .map_err(|e| ObservationStoreError::bulk_index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::failure_body(response).await;
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(ObservationStoreError::bulk_index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ObservationStoreError::parse(e.to_string()))?;
        let locations = Self::bulk_locations(&body, docs.len())?;

        debug!(count = locations.len(), "Geometries bulk indexed");
        Ok(locations)
    }

    /// Search every known observation index pattern at once.
    ///
    /// Missing indices are tolerated so a deployment that never had, say, the
    /// legacy pattern still answers.
    async fn query_observations(
        &self,
        query: &ObservationQuery,
    ) -> Result<Vec<NormalizedHit>, ObservationStoreError> {
        let targets = self.layout.observation_search_targets();
        let target_refs: Vec<&str> = targets.iter().map(String::as_str).collect();
        let body = build_search_body(query, &self.fields);

        let response = self
            .client
            .search(SearchParts::Index(&target_refs))
            .ignore_unavailable(true)
            .allow_no_indices(true)
            .body(body)
            .send()
            .await
            .map_err(|e| ObservationStoreError::query(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = Self::failure_body(response).await;
            error!(status = %status, body = %error_body, "Search request failed");
            return Err(ObservationStoreError::query(format!(
                "Search failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ObservationStoreError::parse(e.to_string()))?;

        let raw_hits = body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let hits: Vec<NormalizedHit> = raw_hits
            .iter()
            .filter_map(|hit| {
                let normalized = normalize_hit(hit, &self.fields);
                if normalized.is_none() {
                    warn!("Skipping search hit without _id");
                }
                normalized
            })
            .collect();

        debug!(targets = ?targets, hits = hits.len(), "Observation query completed");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_location() {
        let body = json!({"_index": ".ds-hunt-trailcam-000001", "_id": "xyz", "result": "created"});
        let location = OpenSearchProvider::stored_location(&body, "hunt-trailcam").unwrap();
        assert_eq!(location, StoredLocation::new(".ds-hunt-trailcam-000001", "xyz"));

        let no_index = json!({"_id": "abc"});
        let location = OpenSearchProvider::stored_location(&no_index, "hunt-events").unwrap();
        assert_eq!(location.index, "hunt-events");

        assert!(matches!(
            OpenSearchProvider::stored_location(&json!({}), "x"),
            Err(ObservationStoreError::ParseError(_))
        ));
    }

    #[test]
    fn test_bulk_locations_success() {
        let body = json!({
            "errors": false,
            "items": [
                {"index": {"_index": "hunt-geo-waypoints", "_id": "1", "status": 201}},
                {"index": {"_index": "hunt-geo-tracks", "_id": "2", "status": 201}}
            ]
        });
        let locations = OpenSearchProvider::bulk_locations(&body, 2).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[1], StoredLocation::new("hunt-geo-tracks", "2"));
    }

    #[test]
    fn test_bulk_locations_aggregates_failures() {
        let body = json!({
            "errors": true,
            "items": [
                {"index": {"_index": "hunt-geo-areas", "_id": "1", "status": 201}},
                {"index": {"_index": "hunt-geo-areas", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "self-intersecting polygon"}}},
                {"index": {"_index": "hunt-geo-areas", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "another"}}}
            ]
        });
        match OpenSearchProvider::bulk_locations(&body, 3) {
            Err(ObservationStoreError::BulkIndexError(msg)) => {
                assert!(msg.contains("2 of 3"));
                assert!(msg.contains("self-intersecting polygon"));
            }
            other => panic!("expected bulk error, got {:?}", other),
        }
    }

    #[test]
    fn test_bulk_locations_count_mismatch() {
        let body = json!({"items": [{"index": {"_id": "1"}}]});
        assert!(matches!(
            OpenSearchProvider::bulk_locations(&body, 2),
            Err(ObservationStoreError::BulkIndexError(_))
        ));
    }
}
