//! Canonical observation documents.
//!
//! This module defines the document every trail-camera image and manual pin
//! converges to before it is handed to the search adapter, together with the
//! derived attributes computed from it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Where an observation came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A photo uploaded from a trail camera.
    TrailcamImage,
    /// A location pinned by hand in the field.
    ManualPin,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::TrailcamImage => "trailcam-image",
            SourceKind::ManualPin => "manual-pin",
        }
    }
}

/// A validated WGS84 coordinate pair.
///
/// Instances built through [`GeoPoint::new`] are always finite and inside
/// lat ∈ [-90, 90], lon ∈ [-180, 180]. Out-of-range input is rejected rather
/// than clamped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Build a point, returning `None` when either coordinate is unusable.
    ///
    /// # Arguments
    ///
    /// * `lat` - Latitude in decimal degrees
    /// * `lon` - Longitude in decimal degrees
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some(Self { lat, lon })
    }
}

/// The 16-point compass rose, clockwise from north.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cardinal16 {
    N,
    Nne,
    Ne,
    Ene,
    E,
    Ese,
    Se,
    Sse,
    S,
    Ssw,
    Sw,
    Wsw,
    W,
    Wnw,
    Nw,
    Nnw,
}

const COMPASS_ROSE: [Cardinal16; 16] = [
    Cardinal16::N,
    Cardinal16::Nne,
    Cardinal16::Ne,
    Cardinal16::Ene,
    Cardinal16::E,
    Cardinal16::Ese,
    Cardinal16::Se,
    Cardinal16::Sse,
    Cardinal16::S,
    Cardinal16::Ssw,
    Cardinal16::Sw,
    Cardinal16::Wsw,
    Cardinal16::W,
    Cardinal16::Wnw,
    Cardinal16::Nw,
    Cardinal16::Nnw,
];

/// Width of one compass sector in degrees.
const SECTOR_DEGREES: f64 = 22.5;

/// Wrap any finite angle into `[0, 360)`.
pub fn wrap_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

impl Cardinal16 {
    /// Bucket a heading into one of the 16 compass labels.
    ///
    /// Each label owns a 22.5° sector centred on its bearing, so the sector
    /// edges sit on the 11.25° half-sectors. An angle exactly on an edge
    /// belongs to the clockwise neighbour. Returns `None` for non-finite input.
    pub fn from_degrees(degrees: f64) -> Option<Self> {
        if !degrees.is_finite() {
            return None;
        }
        let wrapped = wrap_degrees(degrees);
        let index = ((wrapped + SECTOR_DEGREES / 2.0) / SECTOR_DEGREES).floor() as usize % 16;
        Some(COMPASS_ROSE[index])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinal16::N => "N",
            Cardinal16::Nne => "NNE",
            Cardinal16::Ne => "NE",
            Cardinal16::Ene => "ENE",
            Cardinal16::E => "E",
            Cardinal16::Ese => "ESE",
            Cardinal16::Se => "SE",
            Cardinal16::Sse => "SSE",
            Cardinal16::S => "S",
            Cardinal16::Ssw => "SSW",
            Cardinal16::Sw => "SW",
            Cardinal16::Wsw => "WSW",
            Cardinal16::W => "W",
            Cardinal16::Wnw => "WNW",
            Cardinal16::Nw => "NW",
            Cardinal16::Nnw => "NNW",
        }
    }
}

/// Camera heading with its derived compass label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Heading {
    /// Degrees clockwise from north, wrapped into `[0, 360)`.
    #[serde(rename = "deg")]
    pub degrees: f64,
    pub cardinal_16: Cardinal16,
}

impl Heading {
    /// Build a heading from a raw bearing. Returns `None` for non-finite input.
    pub fn from_degrees(degrees: f64) -> Option<Self> {
        let cardinal_16 = Cardinal16::from_degrees(degrees)?;
        Some(Self {
            degrees: wrap_degrees(degrees),
            cardinal_16,
        })
    }
}

/// Coarse time-of-day bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SunPeriod {
    Day,
    Night,
    DuskDawn,
}

impl SunPeriod {
    /// Map an hour of day (0-23) to its bucket.
    ///
    /// Ranges include the lower bound and exclude the upper one:
    /// `[5, 8)` and `[18, 21)` are dusk/dawn, `[8, 18)` is day, the rest is night.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=7 | 18..=20 => SunPeriod::DuskDawn,
            8..=17 => SunPeriod::Day,
            _ => SunPeriod::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SunPeriod::Day => "day",
            SunPeriod::Night => "night",
            SunPeriod::DuskDawn => "dusk_dawn",
        }
    }
}

/// Reference to the stored media object of an image observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MediaRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl MediaRef {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.size_bytes.is_none()
    }
}

/// Canonical document for image and pin observations.
///
/// Fields that were absent or failed to parse upstream are `None` and are
/// omitted from the serialized document entirely.
///
/// # Fields
///
/// - `timestamp`: event time, stored as `@timestamp`
/// - `ingest_timestamp`: when the pipeline processed the record
/// - `source`: trail-camera image or manual pin
/// - `camera_id` / `spot_id`: opaque identifiers
/// - `location`: validated coordinates
/// - `heading`: camera bearing plus compass label
/// - `sun_period`: derived from the hour of `timestamp`
/// - `media`: blob reference, images only
/// - `labels`: free-text tags such as species
/// - `raw_metadata`: original metadata preserved verbatim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalObservation {
    #[serde(rename = "@timestamp", with = "crate::timestamp::millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "crate::timestamp::millis")]
    pub ingest_timestamp: DateTime<Utc>,
    pub source: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<Heading>,
    pub sun_period: SunPeriod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_metadata: BTreeMap<String, String>,
}

impl CanonicalObservation {
    /// Create an observation with only the required fields set.
    ///
    /// `sun_period` is derived from `timestamp` here so the two never disagree.
    ///
    /// # Arguments
    ///
    /// * `source` - Kind of observation
    /// * `timestamp` - Resolved event time
    /// * `ingest_timestamp` - Processing time
    pub fn new(
        source: SourceKind,
        timestamp: DateTime<Utc>,
        ingest_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            ingest_timestamp,
            source,
            camera_id: None,
            spot_id: None,
            location: None,
            heading: None,
            sun_period: SunPeriod::from_hour(timestamp.hour()),
            media: None,
            labels: BTreeSet::new(),
            raw_metadata: BTreeMap::new(),
        }
    }

    /// The media URL, if this observation has one.
    pub fn media_url(&self) -> Option<&str> {
        self.media.as_ref().and_then(|m| m.url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sun_period_boundaries() {
        let cases = [
            (0, SunPeriod::Night),
            (4, SunPeriod::Night),
            (5, SunPeriod::DuskDawn),
            (7, SunPeriod::DuskDawn),
            (8, SunPeriod::Day),
            (17, SunPeriod::Day),
            (18, SunPeriod::DuskDawn),
            (20, SunPeriod::DuskDawn),
            (21, SunPeriod::Night),
            (23, SunPeriod::Night),
        ];
        for (hour, expected) in cases {
            assert_eq!(SunPeriod::from_hour(hour), expected, "hour {}", hour);
        }
    }

    #[test]
    fn test_cardinal_sector_edges() {
        let cases = [
            (0.0, Cardinal16::N),
            (11.2, Cardinal16::N),
            (11.25, Cardinal16::Nne),
            (22.5, Cardinal16::Nne),
            (33.75, Cardinal16::Ne),
            (90.0, Cardinal16::E),
            (180.0, Cardinal16::S),
            (270.0, Cardinal16::W),
            (348.7, Cardinal16::Nnw),
            (348.75, Cardinal16::N),
            (359.9, Cardinal16::N),
        ];
        for (degrees, expected) in cases {
            assert_eq!(
                Cardinal16::from_degrees(degrees),
                Some(expected),
                "degrees {}",
                degrees
            );
        }
    }

    #[test]
    fn test_cardinal_wraps_out_of_range_values() {
        assert_eq!(Cardinal16::from_degrees(-90.0), Some(Cardinal16::W));
        assert_eq!(Cardinal16::from_degrees(450.0), Some(Cardinal16::E));
        assert_eq!(Cardinal16::from_degrees(-0.0), Some(Cardinal16::N));
        assert_eq!(Cardinal16::from_degrees(f64::NAN), None);
        assert_eq!(Cardinal16::from_degrees(f64::INFINITY), None);
    }

    #[test]
    fn test_cardinal_wrap_invariance() {
        // quarter-degree steps stay exactly representable after adding 360
        for step in -1440..2880 {
            let degrees = step as f64 * 0.25;
            assert_eq!(
                Cardinal16::from_degrees(degrees),
                Cardinal16::from_degrees(degrees + 360.0),
                "degrees {}",
                degrees
            );
        }
    }

    #[test]
    fn test_heading_wraps_degrees() {
        let heading = Heading::from_degrees(-45.0).unwrap();
        assert_eq!(heading.degrees, 315.0);
        assert_eq!(heading.cardinal_16, Cardinal16::Nw);
        assert!(Heading::from_degrees(f64::NAN).is_none());
    }

    #[test]
    fn test_geo_point_rejects_out_of_range() {
        assert!(GeoPoint::new(91.0, 10.0).is_none());
        assert!(GeoPoint::new(-90.5, 10.0).is_none());
        assert!(GeoPoint::new(45.0, 180.5).is_none());
        assert!(GeoPoint::new(f64::NAN, 10.0).is_none());
        assert_eq!(
            GeoPoint::new(90.0, -180.0),
            Some(GeoPoint {
                lat: 90.0,
                lon: -180.0
            })
        );
    }

    #[test]
    fn test_new_derives_sun_period() {
        let ts = Utc.with_ymd_and_hms(2024, 10, 3, 19, 15, 0).unwrap();
        let doc = CanonicalObservation::new(SourceKind::TrailcamImage, ts, ts);
        assert_eq!(doc.sun_period, SunPeriod::DuskDawn);
    }

    #[test]
    fn test_serialization_omits_absent_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 10, 3, 12, 0, 0).unwrap();
        let doc = CanonicalObservation::new(SourceKind::ManualPin, ts, ts);

        let value = serde_json::to_value(&doc).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object["@timestamp"], "2024-10-03T12:00:00.000Z");
        assert_eq!(object["source"], "manual-pin");
        assert_eq!(object["sun_period"], "day");
        for absent in [
            "camera_id",
            "spot_id",
            "location",
            "heading",
            "media",
            "labels",
            "raw_metadata",
        ] {
            assert!(!object.contains_key(absent), "{} should be omitted", absent);
        }
    }

    #[test]
    fn test_serialization_wire_names() {
        let ts = Utc.with_ymd_and_hms(2024, 10, 3, 6, 0, 0).unwrap();
        let mut doc = CanonicalObservation::new(SourceKind::TrailcamImage, ts, ts);
        doc.heading = Heading::from_degrees(100.0);
        doc.labels.insert("deer".to_string());
        doc.media = Some(MediaRef {
            url: Some("http://blob/x.jpg".to_string()),
            size_bytes: Some(1024),
        });

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["heading"]["deg"], 100.0);
        assert_eq!(value["heading"]["cardinal_16"], "E");
        assert_eq!(value["media"]["url"], "http://blob/x.jpg");
        assert_eq!(value["labels"][0], "deer");

        let back: CanonicalObservation = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }
}
