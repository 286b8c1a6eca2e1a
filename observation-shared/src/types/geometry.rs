//! Canonical geometry documents produced from GPX and KML files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A `[lon, lat]` pair, in that order.
pub type Position = [f64; 2];

/// File format a geometry was read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GeometrySource {
    Gpx,
    Kml,
}

/// Shape of a geometry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
}

/// What a geometry represents once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Waypoint,
    Track,
    Area,
}

/// Geometry body in GeoJSON-like form: `{"type": ..., "coordinates": ...}`.
///
/// Polygon rings keep their input order; the first ring is the outer
/// boundary and every following ring is a hole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "coordinates", rename_all = "lowercase")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
        }
    }
}

/// Canonical document for a waypoint, track or area.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalGeometry {
    pub source: GeometrySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "desc", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub geom: Geometry,
    /// Recorded time, only known for GPX waypoints.
    #[serde(
        rename = "@timestamp",
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timestamp::millis::option"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "elev_m", skip_serializing_if = "Option::is_none")]
    pub elevation_m: Option<f64>,
}

impl CanonicalGeometry {
    /// Create a geometry document with no optional attributes.
    pub fn new(source: GeometrySource, geom: Geometry) -> Self {
        Self {
            source,
            name: None,
            description: None,
            geom,
            timestamp: None,
            elevation_m: None,
        }
    }

    pub fn with_labels(mut self, name: Option<String>, description: Option<String>) -> Self {
        self.name = name;
        self.description = description;
        self
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geom.geometry_type()
    }

    /// Classify the document: points are waypoints, lines are tracks, polygons are areas.
    pub fn kind(&self) -> GeometryKind {
        match self.geometry_type() {
            GeometryType::Point => GeometryKind::Waypoint,
            GeometryType::LineString => GeometryKind::Track,
            GeometryType::Polygon => GeometryKind::Area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_serialization() {
        let doc = CanonicalGeometry::new(GeometrySource::Gpx, Geometry::Point([-93.1, 44.9]))
            .with_labels(Some("Stand 4".to_string()), None);

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["source"], "gpx");
        assert_eq!(value["name"], "Stand 4");
        assert_eq!(value["geom"]["type"], "point");
        assert_eq!(value["geom"]["coordinates"][0], -93.1);
        assert_eq!(value["geom"]["coordinates"][1], 44.9);
        assert!(value.get("desc").is_none());
        assert!(value.get("@timestamp").is_none());
        assert!(value.get("elev_m").is_none());
    }

    #[test]
    fn test_polygon_keeps_ring_order() {
        let outer = vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 0.0]];
        let hole = vec![[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]];
        let doc = CanonicalGeometry::new(
            GeometrySource::Kml,
            Geometry::Polygon(vec![outer.clone(), hole.clone()]),
        );

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["geom"]["type"], "polygon");
        let back: CanonicalGeometry = serde_json::from_value(value).unwrap();
        assert_eq!(back.geom, Geometry::Polygon(vec![outer, hole]));
    }

    #[test]
    fn test_kind_classification() {
        let point = CanonicalGeometry::new(GeometrySource::Kml, Geometry::Point([0.0, 0.0]));
        let line = CanonicalGeometry::new(
            GeometrySource::Kml,
            Geometry::LineString(vec![[0.0, 0.0], [1.0, 1.0]]),
        );
        let area = CanonicalGeometry::new(GeometrySource::Kml, Geometry::Polygon(vec![]));

        assert_eq!(point.kind(), GeometryKind::Waypoint);
        assert_eq!(line.kind(), GeometryKind::Track);
        assert_eq!(line.geometry_type(), GeometryType::LineString);
        assert_eq!(area.kind(), GeometryKind::Area);
    }
}
