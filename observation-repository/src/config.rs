//! Configuration types for the ObservationSearchService.

use observation_shared::MAX_QUERY_LIMIT;

/// Configuration for the ObservationSearchService.
///
/// Controls how large bulk writes and searches may get, so that a single call
/// cannot send an unbounded batch or request an unbounded scan.
#[derive(Debug, Clone)]
pub struct ObservationSearchServiceConfig {
    /// Maximum number of documents allowed in a single bulk write.
    ///
    /// Set to `None` to disable the limit (not recommended for production).
    /// Defaults to 1000 if not specified.
    pub max_batch_size: Option<usize>,

    /// Maximum number of hits a single query may return. Larger limits are capped.
    pub max_query_limit: usize,
}

impl Default for ObservationSearchServiceConfig {
    fn default() -> Self {
        Self {
            max_batch_size: Some(1000),
            max_query_limit: MAX_QUERY_LIMIT,
        }
    }
}

impl ObservationSearchServiceConfig {
    /// Create a config with no batch size limit.
    ///
    /// # Warning
    ///
    /// Removing batch size limits can lead to memory issues and timeouts on
    /// very large GPX/KML files. Not recommended for production.
    pub fn unlimited() -> Self {
        Self {
            max_batch_size: None,
            ..Self::default()
        }
    }

    /// Create a config with a custom batch size limit.
    ///
    /// # Arguments
    ///
    /// * `max_batch_size` - Maximum number of documents allowed in a single bulk write
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: Some(max_batch_size),
            ..Self::default()
        }
    }
}
