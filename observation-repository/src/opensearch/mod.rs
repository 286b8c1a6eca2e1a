//! OpenSearch implementation of the observation store.
//!
//! This module provides a concrete implementation of `ObservationStore`
//! using OpenSearch as the backend, plus the query builder and field lookup
//! table it relies on.

pub mod field_lookup;
mod index_config;
mod provider;
pub mod query_builder;

pub use field_lookup::FieldLookup;
pub use index_config::{
    geometry_mappings, legacy_observation_mappings, observation_mappings, IndexLayout,
    IndexTemplate, DEFAULT_AREAS_INDEX, DEFAULT_EVENTS_INDEX, DEFAULT_LEGACY_OBSERVATION_PATTERN,
    DEFAULT_OBSERVATION_STREAM, DEFAULT_TRACKS_INDEX, DEFAULT_WAYPOINTS_INDEX,
};
pub use provider::{OpenSearchProvider, OpenSearchSettings};
