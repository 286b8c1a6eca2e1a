//! Processor module for the observation indexer.
//!
//! Transforms ingest jobs into canonical observation documents.

pub mod normalizer;
mod observation_processor;

pub use observation_processor::ObservationProcessor;
