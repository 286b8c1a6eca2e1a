//! # Observation Repository
//!
//! This crate provides the search adapter for canonical observations. It
//! includes the store interface, error types, a validating service on top of
//! it, and a concrete OpenSearch implementation that queries every known
//! index layout and normalizes hits into one shape.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod service;
pub mod types;

pub use config::ObservationSearchServiceConfig;
pub use errors::ObservationStoreError;
pub use interfaces::ObservationStore;
pub use opensearch::{IndexLayout, OpenSearchProvider, OpenSearchSettings};
pub use service::ObservationSearchService;
pub use types::StoredLocation;
