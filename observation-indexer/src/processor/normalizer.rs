//! EXIF and form-field normalization.
//!
//! Turns an [`ObservationSeed`] into a [`CanonicalObservation`]. Nothing in
//! here fails: a field that is missing or does not parse is left out of the
//! document, and the event time always has a fallback.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use observation_shared::{
    timestamp::parse_rfc3339, CanonicalObservation, GeoPoint, Heading, MediaRef, ObservationSeed,
    RawNumber, SourceKind,
};

/// EXIF keys holding a capture time, highest priority first.
pub const TIMESTAMP_KEYS: [&str; 3] = ["EXIF DateTimeOriginal", "Image DateTime", "GPS GPSDate"];

/// Wall-clock formats tried before RFC 3339. Parsed values are taken as UTC.
const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Date-only format used by `GPS GPSDate`.
const DATE_FORMAT: &str = "%Y:%m:%d";

const GPS_LATITUDE: &str = "GPS GPSLatitude";
const GPS_LATITUDE_REF: &str = "GPS GPSLatitudeRef";
const GPS_LONGITUDE: &str = "GPS GPSLongitude";
const GPS_LONGITUDE_REF: &str = "GPS GPSLongitudeRef";
const GPS_IMG_DIRECTION: &str = "GPS GPSImgDirection";

/// Build the canonical document for one seed.
///
/// # Arguments
///
/// * `seed` - Raw upload fields and EXIF tags
/// * `enqueued_at` - When the job was put on the queue, if known
/// * `now` - Processing time; becomes `ingest_timestamp`
pub fn normalize(
    seed: &ObservationSeed,
    enqueued_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CanonicalObservation {
    let timestamp = resolve_timestamp(&seed.exif, seed.observed_at, enqueued_at, now);

    let mut doc = CanonicalObservation::new(seed.source, timestamp, now);
    doc.camera_id = non_blank(seed.camera_id.as_deref());
    doc.spot_id = non_blank(seed.spot_id.as_deref());
    doc.location = resolve_location(seed);
    doc.heading = resolve_heading(seed);
    doc.labels = resolve_labels(seed);
    doc.raw_metadata = seed.exif.clone();

    if seed.source == SourceKind::TrailcamImage {
        let media = MediaRef {
            url: non_blank(seed.media_url.as_deref()),
            size_bytes: seed.size_bytes,
        };
        doc.media = (!media.is_empty()).then_some(media);
    }

    doc
}

/// Resolve the event time.
///
/// EXIF keys are tried in [`TIMESTAMP_KEYS`] order and the first value that
/// parses wins. Then the explicit `observed_at`, then the enqueue time, then
/// `now`.
pub fn resolve_timestamp(
    exif: &BTreeMap<String, String>,
    observed_at: Option<DateTime<Utc>>,
    enqueued_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    TIMESTAMP_KEYS
        .iter()
        .filter_map(|key| exif.get(*key))
        .find_map(|raw| parse_exif_datetime(raw))
        .or(observed_at)
        .or(enqueued_at)
        .unwrap_or(now)
}

/// Parse one EXIF date/time value against the accepted formats, in order.
pub fn parse_exif_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| parse_rfc3339(raw))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

/// Coordinates from the form fields when both were supplied, else from EXIF GPS tags.
fn resolve_location(seed: &ObservationSeed) -> Option<GeoPoint> {
    if let (Some(lat), Some(lon)) = (&seed.lat, &seed.lon) {
        return GeoPoint::new(lat.as_finite_f64()?, lon.as_finite_f64()?);
    }

    let lat = exif_coordinate(&seed.exif, GPS_LATITUDE, GPS_LATITUDE_REF, "S")?;
    let lon = exif_coordinate(&seed.exif, GPS_LONGITUDE, GPS_LONGITUDE_REF, "W")?;
    GeoPoint::new(lat, lon)
}

fn resolve_heading(seed: &ObservationSeed) -> Option<Heading> {
    seed.heading_deg
        .as_ref()
        .and_then(RawNumber::as_finite_f64)
        .or_else(|| {
            seed.exif
                .get(GPS_IMG_DIRECTION)
                .and_then(|raw| parse_rational(raw))
        })
        .and_then(Heading::from_degrees)
}

fn resolve_labels(seed: &ObservationSeed) -> BTreeSet<String> {
    seed.labels
        .iter()
        .map(String::as_str)
        .chain(seed.label.as_deref())
        .filter_map(|label| non_blank(Some(label)))
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Signed decimal degrees from an EXIF degrees/minutes/seconds tag and its
/// hemisphere reference.
fn exif_coordinate(
    exif: &BTreeMap<String, String>,
    value_key: &str,
    ref_key: &str,
    negative_ref: &str,
) -> Option<f64> {
    let magnitude = parse_dms(exif.get(value_key)?)?;
    let negative = exif
        .get(ref_key)
        .is_some_and(|r| r.trim().eq_ignore_ascii_case(negative_ref));
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse `[44, 30, 617/20]`, `44/1, 30/1, 3085/100` or a plain decimal.
fn parse_dms(raw: &str) -> Option<f64> {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let parts = inner
        .split(',')
        .map(parse_rational)
        .collect::<Option<Vec<f64>>>()?;

    let value = match parts.as_slice() {
        [degrees] => *degrees,
        [degrees, minutes] => degrees + minutes / 60.0,
        [degrees, minutes, seconds] => degrees + minutes / 60.0 + seconds / 3600.0,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Parse an EXIF rational (`617/20`) or a plain number.
fn parse_rational(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let value = match raw.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator: f64 = numerator.trim().parse().ok()?;
            let denominator: f64 = denominator.trim().parse().ok()?;
            if denominator == 0.0 {
                return None;
            }
            numerator / denominator
        }
        None => raw.parse().ok()?,
    };
    value.is_finite().then_some(value)
}
