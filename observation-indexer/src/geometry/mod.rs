//! Geometry ingestion for GPX and KML files.
//!
//! A file is parsed completely before anything is written, so a parse error
//! writes nothing. The documents of one file go to the search backend in
//! bulk requests of at most [`GEOMETRY_BATCH_SIZE`](crate::loader::GEOMETRY_BATCH_SIZE);
//! a failed request is reported as one error for the whole file.

pub mod feature;
pub mod gpx;
pub mod kml;
mod xml;

use serde::Serialize;
use tracing::{info, instrument};

use crate::errors::IndexingError;
use crate::loader::ObservationLoader;
use feature::Feature;
use observation_shared::{CanonicalGeometry, GeometryKind, GeometrySource};

/// Number of documents written per kind for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestCounts {
    pub waypoints: usize,
    pub tracks: usize,
    pub areas: usize,
}

impl IngestCounts {
    /// Count documents by kind.
    pub fn tally(docs: &[CanonicalGeometry]) -> Self {
        docs.iter().fold(Self::default(), |mut counts, doc| {
            match doc.kind() {
                GeometryKind::Waypoint => counts.waypoints += 1,
                GeometryKind::Track => counts.tracks += 1,
                GeometryKind::Area => counts.areas += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.waypoints + self.tracks + self.areas
    }
}

/// Reads GPX/KML files and indexes their waypoints, tracks and areas.
pub struct GeometryIngestor {
    loader: ObservationLoader,
}

impl GeometryIngestor {
    pub fn new(loader: ObservationLoader) -> Self {
        Self { loader }
    }

    /// Ingest a GPX file.
    ///
    /// Waypoints become waypoint documents. Every track segment and every
    /// route becomes a track document.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn ingest_gpx(&self, bytes: &[u8]) -> Result<IngestCounts, IndexingError> {
        let features = gpx::parse(bytes)?;
        self.ingest(GeometrySource::Gpx, features).await
    }

    /// Ingest a KML file.
    ///
    /// Documents and folders are flattened; points, line strings and polygons
    /// become waypoints, tracks and areas.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn ingest_kml(&self, bytes: &[u8]) -> Result<IngestCounts, IndexingError> {
        let features = kml::parse(bytes)?;
        self.ingest(GeometrySource::Kml, features).await
    }

    async fn ingest(
        &self,
        source: GeometrySource,
        features: Vec<Feature>,
    ) -> Result<IngestCounts, IndexingError> {
        let docs = feature::flatten(features, source);
        let counts = IngestCounts::tally(&docs);

        if docs.is_empty() {
            info!(source = ?source, "File contained no geometries");
            return Ok(counts);
        }

        self.loader.load_geometries(&docs).await?;

        info!(
            source = ?source,
            waypoints = counts.waypoints,
            tracks = counts.tracks,
            areas = counts.areas,
            "Geometry file ingested"
        );
        Ok(counts)
    }
}
