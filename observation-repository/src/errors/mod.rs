//! Error types for the observation repository.
//!
//! This module provides a unified error type for all store operations.

mod observation_store_error;

pub use observation_store_error::ObservationStoreError;
