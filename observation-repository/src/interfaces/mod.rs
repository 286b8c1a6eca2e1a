//! Interface definitions for the observation store.
//!
//! This module defines the abstract `ObservationStore` trait that allows
//! for dependency injection and swappable search backend implementations.

mod observation_store;

pub use observation_store::ObservationStore;
