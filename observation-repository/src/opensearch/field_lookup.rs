//! Versioned field lookup table.
//!
//! Each logical attribute has an ordered list of candidate source fields, one
//! per document layout that has ever been written. Reads try the candidates in
//! order and keep the first usable value; values from different candidates are
//! never merged. Supporting a new layout means adding a candidate here.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use observation_shared::{GeoPoint, NormalizedHit};
use serde_json::Value;

/// Candidate source fields per logical attribute, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLookup {
    /// Event time. Every candidate is range-filtered and sorted on.
    pub timestamp: &'static [&'static str],
    pub url: &'static [&'static str],
    pub location: &'static [&'static str],
    pub labels: &'static [&'static str],
    pub camera_id: &'static [&'static str],
    /// Geo-point fields the bounding-box filter is applied to, disjunctively.
    pub geo_filter: &'static [&'static str],
    /// Free-text fields with optional `^boost` suffixes.
    pub text: &'static [&'static str],
}

impl FieldLookup {
    /// Lookup table covering every layout the pipeline has produced.
    pub const CURRENT: FieldLookup = FieldLookup {
        timestamp: &["@timestamp", "timestamp", "capture_time"],
        url: &["media.url", "media_url", "image_url"],
        location: &["location", "camera.location", "geo"],
        labels: &["labels", "labels.user", "species"],
        camera_id: &["camera_id", "camera.id"],
        geo_filter: &["location", "camera.location"],
        text: &[
            "labels^2",
            "labels.user^2",
            "species",
            "camera_id",
            "camera.id",
            "camera.model",
            "camera.make",
        ],
    };
}

impl Default for FieldLookup {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Resolve a dotted path against a document source.
///
/// Tries the nested form first (`{"camera": {"id": ..}}`) and then a literal
/// dotted key (`{"camera.id": ..}`), since both shapes exist in stored data.
pub fn lookup<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    let nested = path
        .split('.')
        .try_fold(source, |current, segment| current.get(segment));
    match nested {
        Some(Value::Null) | None => source.get(path).filter(|v| !v.is_null()),
        found => found,
    }
}

/// Return the first candidate whose value `extract` accepts.
pub fn first_present<T>(
    source: &Value,
    candidates: &[&str],
    extract: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    candidates
        .iter()
        .find_map(|field| lookup(source, field).and_then(&extract))
}

/// A non-empty string; numbers are rendered as text.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A timestamp stored as RFC 3339, as a naive ISO string (taken as UTC), or as
/// epoch milliseconds.
pub fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// A geo point in any of the accepted encodings: `{lat, lon}`, `"lat,lon"`
/// or `[lon, lat]`. Out-of-range values are rejected.
pub fn as_geo_point(value: &Value) -> Option<GeoPoint> {
    match value {
        Value::Object(map) => {
            let lat = map.get("lat").and_then(Value::as_f64)?;
            let lon = map.get("lon").and_then(Value::as_f64)?;
            GeoPoint::new(lat, lon)
        }
        Value::String(s) => {
            let (lat, lon) = s.split_once(',')?;
            GeoPoint::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?)
        }
        Value::Array(items) if items.len() == 2 => {
            GeoPoint::new(items[1].as_f64()?, items[0].as_f64()?)
        }
        _ => None,
    }
}

/// A non-empty list of labels from an array of strings or a single string.
///
/// Anything else, including an object such as the legacy `labels: {user: [..]}`,
/// is not a usable label value.
pub fn as_labels(value: &Value) -> Option<Vec<String>> {
    let labels: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };
    (!labels.is_empty()).then_some(labels)
}

/// Normalize one raw search hit into a `NormalizedHit`.
///
/// Returns `None` if the hit has no `_id`.
pub fn normalize_hit(hit: &Value, fields: &FieldLookup) -> Option<NormalizedHit> {
    let id = hit.get("_id").and_then(Value::as_str)?;
    let index = hit.get("_index").and_then(Value::as_str).unwrap_or_default();
    let empty = Value::Object(Default::default());
    let source = hit.get("_source").unwrap_or(&empty);

    let mut normalized = NormalizedHit::new(id, index);
    normalized.timestamp = first_present(source, fields.timestamp, as_timestamp);
    normalized.url = first_present(source, fields.url, as_text);
    normalized.location = first_present(source, fields.location, as_geo_point);
    normalized.labels = first_present(source, fields.labels, as_labels).unwrap_or_default();
    normalized.camera_id = first_present(source, fields.camera_id, as_text);
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_and_dotted_keys() {
        let nested = json!({"camera": {"id": "cam-1"}});
        let dotted = json!({"camera.id": "cam-2"});
        let null_nested = json!({"camera": {"id": null}, "camera.id": "cam-3"});

        assert_eq!(lookup(&nested, "camera.id"), Some(&json!("cam-1")));
        assert_eq!(lookup(&dotted, "camera.id"), Some(&json!("cam-2")));
        assert_eq!(lookup(&null_nested, "camera.id"), Some(&json!("cam-3")));
        assert_eq!(lookup(&nested, "camera.model"), None);
    }

    #[test]
    fn test_normalize_current_layout() {
        let hit = json!({
            "_id": "a1",
            "_index": ".ds-hunt-trailcam-2024.10.03-000001",
            "_source": {
                "@timestamp": "2024-10-03T06:12:44.000Z",
                "camera_id": "cam-7",
                "location": {"lat": 44.9, "lon": -93.2},
                "labels": ["deer", "buck"],
                "media": {"url": "http://blob/trailcam-images/a.jpg"}
            }
        });

        let normalized = normalize_hit(&hit, &FieldLookup::CURRENT).unwrap();
        assert_eq!(normalized.id, "a1");
        assert_eq!(normalized.camera_id.as_deref(), Some("cam-7"));
        assert_eq!(normalized.url.as_deref(), Some("http://blob/trailcam-images/a.jpg"));
        assert_eq!(normalized.location, GeoPoint::new(44.9, -93.2));
        assert_eq!(normalized.labels, vec!["deer", "buck"]);
        assert_eq!(
            normalized.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 10, 3, 6, 12, 44).unwrap())
        );
    }

    #[test]
    fn test_normalize_legacy_layout() {
        let hit = json!({
            "_id": "b2",
            "_index": "hunt-images-2023.11",
            "_source": {
                "@timestamp": "2023-11-12T17:40:00",
                "camera": {"id": "north-ridge", "location": "45.1,-92.8"},
                "labels": {"user": ["turkey"]},
                "media": {"url": "http://old/b.jpg", "size_bytes": 2048}
            }
        });

        let normalized = normalize_hit(&hit, &FieldLookup::CURRENT).unwrap();
        assert_eq!(normalized.camera_id.as_deref(), Some("north-ridge"));
        assert_eq!(normalized.location, GeoPoint::new(45.1, -92.8));
        assert_eq!(normalized.labels, vec!["turkey"]);
        assert_eq!(normalized.url.as_deref(), Some("http://old/b.jpg"));
        assert_eq!(
            normalized.timestamp,
            Some(Utc.with_ymd_and_hms(2023, 11, 12, 17, 40, 0).unwrap())
        );
    }

    #[test]
    fn test_normalize_intermediate_layout() {
        let hit = json!({
            "_id": "c3",
            "_index": "hunt-trailcam-2024.01",
            "_source": {
                "@timestamp": "2024-01-05T03:00:00Z",
                "camera_id": "cam-2",
                "image_url": "http://blob/c.jpg",
                "species": "coyote",
                "location": {"lat": 44.0, "lon": -93.0}
            }
        });

        let normalized = normalize_hit(&hit, &FieldLookup::CURRENT).unwrap();
        assert_eq!(normalized.url.as_deref(), Some("http://blob/c.jpg"));
        assert_eq!(normalized.labels, vec!["coyote"]);
    }

    #[test]
    fn test_secondary_candidates() {
        let hit = json!({
            "_id": "d4",
            "_source": {
                "capture_time": "2022-06-01T12:00:00Z",
                "media_url": "http://blob/d.jpg",
                "geo": [-93.5, 44.5]
            }
        });

        let normalized = normalize_hit(&hit, &FieldLookup::CURRENT).unwrap();
        assert_eq!(normalized.index, "");
        assert_eq!(normalized.url.as_deref(), Some("http://blob/d.jpg"));
        assert_eq!(normalized.location, GeoPoint::new(44.5, -93.5));
        assert_eq!(
            normalized.timestamp,
            Some(Utc.with_ymd_and_hms(2022, 6, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_first_present_never_merges() {
        let source = json!({
            "location": {"lat": 10.0, "lon": 20.0},
            "camera": {"location": {"lat": 30.0, "lon": 40.0}},
            "labels": ["elk"],
            "species": "moose"
        });

        assert_eq!(
            first_present(&source, FieldLookup::CURRENT.location, as_geo_point),
            GeoPoint::new(10.0, 20.0)
        );
        assert_eq!(
            first_present(&source, FieldLookup::CURRENT.labels, as_labels),
            Some(vec!["elk".to_string()])
        );
    }

    #[test]
    fn test_unusable_values_fall_through() {
        let source = json!({
            "location": {"lat": 91.0, "lon": 20.0},
            "camera": {"location": [40.0, 30.0]},
            "labels": [],
            "camera_id": ""
        });

        assert_eq!(
            first_present(&source, FieldLookup::CURRENT.location, as_geo_point),
            GeoPoint::new(30.0, 40.0)
        );
        assert_eq!(first_present(&source, FieldLookup::CURRENT.labels, as_labels), None);
        assert_eq!(first_present(&source, FieldLookup::CURRENT.camera_id, as_text), None);
    }

    #[test]
    fn test_normalize_requires_id() {
        assert!(normalize_hit(&json!({"_source": {}}), &FieldLookup::CURRENT).is_none());

        let bare = normalize_hit(&json!({"_id": "x"}), &FieldLookup::CURRENT).unwrap();
        assert!(bare.timestamp.is_none());
        assert!(bare.labels.is_empty());
    }

    #[test]
    fn test_epoch_millis_timestamp() {
        assert_eq!(
            as_timestamp(&json!(1_700_000_000_000i64)),
            Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
        );
        assert_eq!(as_timestamp(&json!("not a date")), None);
    }
}
