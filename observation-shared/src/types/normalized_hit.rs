//! The single result shape returned from observation searches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::observation::GeoPoint;

/// One search hit, independent of which stored layout produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedHit {
    /// Backend document id.
    pub id: String,

    /// Physical index the hit came from.
    pub index: String,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timestamp::millis::option"
    )]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
}

impl NormalizedHit {
    /// Create a hit with only its identity set.
    pub fn new(id: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: index.into(),
            timestamp: None,
            url: None,
            location: None,
            labels: Vec::new(),
            camera_id: None,
        }
    }
}
