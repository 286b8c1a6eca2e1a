//! Result types for store operations.

use std::fmt;

/// Where a document ended up: the physical index and its server-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLocation {
    pub index: String,
    pub id: String,
}

impl StoredLocation {
    pub fn new(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for StoredLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.id)
    }
}
