//! # Observation Shared
//!
//! This crate defines the canonical document model shared by the ingestion
//! pipelines and the search adapter. It includes the observation and geometry
//! documents, the ingest job contract, query parameters and the normalized
//! hit shape returned from searches.

pub mod timestamp;
pub mod types;

pub use types::geometry::{
    CanonicalGeometry, Geometry, GeometryKind, GeometrySource, GeometryType, Position,
};
pub use types::ingest_job::{IngestJob, ObservationSeed, RawNumber, TraceCarrier};
pub use types::normalized_hit::NormalizedHit;
pub use types::observation::{
    Cardinal16, CanonicalObservation, GeoPoint, Heading, MediaRef, SourceKind, SunPeriod,
};
pub use types::observation_query::{
    BoundingBox, ObservationQuery, TimeRange, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT,
};
