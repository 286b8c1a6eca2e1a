//! # Observation Indexer
//!
//! Worker pipeline for field observations - consumes ingest jobs from Kafka,
//! normalizes them into canonical documents and indexes them into OpenSearch.
//!
//! ## Architecture
//!
//! The indexer follows the Consumer-Processor-Loader pattern:
//!
//! 1. **Consumer**: Receives ingest jobs from Kafka, one at a time
//! 2. **Processor**: Normalizes raw upload metadata into a canonical observation
//! 3. **Loader**: Indexes documents into OpenSearch
//! 4. **Orchestrator**: Coordinates the flow and acknowledges each job
//!
//! GPX and KML files bypass the queue: [`geometry::GeometryIngestor`] parses
//! a whole file and bulk-indexes its waypoints, tracks and areas.
//!
//! ## Modules
//!
//! - [`config`]: Settings and dependency initialization
//! - [`consumer`]: Kafka consumer for ingest jobs
//! - [`processor`]: EXIF/metadata normalizer
//! - [`loader`]: Indexes documents into OpenSearch
//! - [`orchestrator`]: Coordinates the ingest flow
//! - [`geometry`]: GPX/KML ingestion
//! - [`upload`]: Blob storage and job producer used by the upload side
//! - [`telemetry`]: Trace propagation and non-fatal side effects
//! - [`errors`]: Error types for the indexer

pub mod config;
pub mod consumer;
pub mod errors;
pub mod geometry;
pub mod loader;
pub mod orchestrator;
pub mod processor;
pub mod telemetry;
pub mod upload;

pub use config::{Dependencies, IndexerSettings};
pub use errors::IndexingError;
