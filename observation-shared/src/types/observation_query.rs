//! Query parameters for observation searches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::observation::GeoPoint;

/// Upper bound on the number of hits a single query may request.
pub const MAX_QUERY_LIMIT: usize = 500;

/// Default number of hits when the caller does not ask for a specific count.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Inclusive event-time range. Either side may be open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TimeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// True when neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether `ts` falls inside `[start, end]`.
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| *ts >= start) && self.end.map_or(true, |end| *ts <= end)
    }
}

/// Rectangular geographic filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Parse a `"minLon,minLat,maxLon,maxLat"` string.
    ///
    /// Returns `None` for anything that is not four finite, in-range numbers
    /// with `min_lat <= max_lat`. User-supplied boxes are often malformed, so
    /// callers treat `None` as "no geographic filter" rather than an error.
    ///
    /// # Example
    ///
    /// ```
    /// use observation_shared::BoundingBox;
    ///
    /// assert!(BoundingBox::parse("-94.0,44.0,-93.0,45.0").is_some());
    /// assert!(BoundingBox::parse("abc").is_none());
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<f64> = raw
            .split(',')
            .map(|part| part.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect::<Option<Vec<_>>>()?;

        let [min_lon, min_lat, max_lon, max_lat] = parts.as_slice() else {
            return None;
        };

        let lat_ok = |v: f64| (-90.0..=90.0).contains(&v);
        let lon_ok = |v: f64| (-180.0..=180.0).contains(&v);
        if !lat_ok(*min_lat) || !lat_ok(*max_lat) || !lon_ok(*min_lon) || !lon_ok(*max_lon) {
            return None;
        }
        if min_lat > max_lat {
            return None;
        }

        Some(Self {
            min_lon: *min_lon,
            min_lat: *min_lat,
            max_lon: *max_lon,
            max_lat: *max_lat,
        })
    }

    /// Whether the point lies inside the box, edges included.
    ///
    /// A box with `min_lon > max_lon` crosses the antimeridian.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        let lat_inside = point.lat >= self.min_lat && point.lat <= self.max_lat;
        let lon_inside = if self.min_lon <= self.max_lon {
            point.lon >= self.min_lon && point.lon <= self.max_lon
        } else {
            point.lon >= self.min_lon || point.lon <= self.max_lon
        };
        lat_inside && lon_inside
    }
}

/// A bounded observation search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationQuery {
    /// Free text matched against label and identifier fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,

    /// Maximum number of hits. Must be positive; capped at [`MAX_QUERY_LIMIT`].
    pub limit: usize,
}

impl Default for ObservationQuery {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_LIMIT)
    }
}

impl ObservationQuery {
    /// Create an unfiltered query returning at most `limit` hits.
    pub fn new(limit: usize) -> Self {
        Self {
            text: None,
            time_range: None,
            bbox: None,
            limit: limit.min(MAX_QUERY_LIMIT),
        }
    }

    /// Set the free-text term. Blank text is ignored.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        self.text = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Set the time range. An unbounded range is dropped.
    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = (!range.is_unbounded()).then_some(range);
        self
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Set the bounding box from user input, silently dropping a malformed value.
    pub fn with_bbox_str(mut self, raw: &str) -> Self {
        self.bbox = BoundingBox::parse(raw);
        self
    }

    /// Set the limit for results, capped at [`MAX_QUERY_LIMIT`].
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_QUERY_LIMIT);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bbox_parse_valid() {
        let bbox = BoundingBox::parse(" -94.5, 44.0 ,-93.0,45.25").unwrap();
        assert_eq!(bbox.min_lon, -94.5);
        assert_eq!(bbox.min_lat, 44.0);
        assert_eq!(bbox.max_lon, -93.0);
        assert_eq!(bbox.max_lat, 45.25);
    }

    #[test]
    fn test_bbox_parse_malformed() {
        for raw in [
            "abc",
            "",
            "1,2,3",
            "1,2,3,4,5",
            "1,2,x,4",
            "-94,95,-93,96",
            "-200,44,-93,45",
            "-94,45,-93,44",
            "NaN,1,2,3",
        ] {
            assert!(BoundingBox::parse(raw).is_none(), "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_bbox_contains() {
        let bbox = BoundingBox::parse("-94,44,-93,45").unwrap();
        assert!(bbox.contains(&GeoPoint::new(44.5, -93.5).unwrap()));
        assert!(bbox.contains(&GeoPoint::new(44.0, -94.0).unwrap()));
        assert!(!bbox.contains(&GeoPoint::new(46.0, -93.5).unwrap()));

        let across = BoundingBox::parse("170,-10,-170,10").unwrap();
        assert!(across.contains(&GeoPoint::new(0.0, 179.0).unwrap()));
        assert!(across.contains(&GeoPoint::new(0.0, -175.0).unwrap()));
        assert!(!across.contains(&GeoPoint::new(0.0, 0.0).unwrap()));
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 10, 2, 0, 0, 0).unwrap();
        let range = TimeRange::new(Some(start), Some(end));

        assert!(range.contains(&start));
        assert!(range.contains(&end));
        assert!(!range.contains(&(end + chrono::Duration::milliseconds(1))));

        let open_start = TimeRange::new(None, Some(end));
        assert!(open_start.contains(&(start - chrono::Duration::days(365))));
    }

    #[test]
    fn test_query_builder() {
        let query = ObservationQuery::new(20)
            .with_text("  deer ")
            .with_bbox_str("abc")
            .with_time_range(TimeRange::default());

        assert_eq!(query.text.as_deref(), Some("deer"));
        assert!(query.bbox.is_none());
        assert!(query.time_range.is_none());
        assert_eq!(query.limit, 20);

        assert!(ObservationQuery::new(10).with_text("   ").text.is_none());
    }

    #[test]
    fn test_with_limit_caps() {
        assert_eq!(ObservationQuery::new(10_000).limit, MAX_QUERY_LIMIT);
        assert_eq!(ObservationQuery::default().with_limit(900).limit, MAX_QUERY_LIMIT);
        assert_eq!(ObservationQuery::default().limit, DEFAULT_QUERY_LIMIT);
    }
}
