//! This module defines the core data structures shared across the observation pipelines.
//! It re-exports the canonical documents, the job contract and the query types.

pub mod geometry;
pub mod ingest_job;
pub mod normalized_hit;
pub mod observation;
pub mod observation_query;

pub use geometry::CanonicalGeometry;
pub use ingest_job::IngestJob;
pub use normalized_hit::NormalizedHit;
pub use observation::CanonicalObservation;
pub use observation_query::ObservationQuery;
