//! The job contract between the upload side and the worker pipeline.
//!
//! An [`IngestJob`] is serialized as JSON onto the ingestion queue. It carries
//! the raw, unvalidated inputs for one observation plus the trace propagation
//! carrier of the request that created it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::observation::SourceKind;

/// Trace propagation carrier, e.g. `{"traceparent": "00-..."}`.
pub type TraceCarrier = BTreeMap<String, String>;

/// A numeric form field that may arrive as a JSON number or as text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    /// The value as a finite float, or `None` if it does not parse or is NaN/infinite.
    pub fn as_finite_f64(&self) -> Option<f64> {
        let value = match self {
            RawNumber::Number(n) => *n,
            RawNumber::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        RawNumber::Number(value)
    }
}

impl From<&str> for RawNumber {
    fn from(value: &str) -> Self {
        RawNumber::Text(value.to_string())
    }
}

/// Raw inputs for one observation, exactly as the uploader supplied them.
///
/// Nothing here is validated; the normalizer decides what survives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationSeed {
    pub source: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<RawNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<RawNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<RawNumber>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Single label field written by older upload forms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Explicit event time, used by manual pins.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timestamp::millis::option"
    )]
    pub observed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exif: BTreeMap<String, String>,
}

impl ObservationSeed {
    /// Create an empty seed for the given source kind.
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            camera_id: None,
            spot_id: None,
            lat: None,
            lon: None,
            heading_deg: None,
            labels: Vec::new(),
            label: None,
            media_url: None,
            size_bytes: None,
            observed_at: None,
            exif: BTreeMap::new(),
        }
    }
}

/// A unit of work on the ingestion queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestJob {
    /// Canonical payload seed.
    pub seed: ObservationSeed,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trace_context: TraceCarrier,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timestamp::millis::option"
    )]
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl IngestJob {
    /// Wrap a seed into a job stamped with the current time.
    pub fn new(seed: ObservationSeed) -> Self {
        Self {
            seed,
            trace_context: TraceCarrier::new(),
            enqueued_at: Some(Utc::now()),
        }
    }
}
