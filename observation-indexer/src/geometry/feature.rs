//! Generic feature tree and its flattening into canonical geometries.
//!
//! Both readers produce this tree. Containers (KML documents and folders)
//! nest arbitrarily; only placemarks carry geometry.

use chrono::{DateTime, Utc};
use observation_shared::{CanonicalGeometry, Geometry, GeometrySource, Position};

/// Geometry carried by one placemark.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Position),
    Line(Vec<Position>),
    /// Several lines sharing one name, such as the segments of a GPX track.
    MultiLine(Vec<Vec<Position>>),
    /// Rings, outer boundary first.
    Polygon(Vec<Vec<Position>>),
    /// A KML `MultiGeometry`; flattened like a container.
    Multi(Vec<Shape>),
}

/// A leaf feature with its descriptive attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Placemark {
    pub name: Option<String>,
    pub description: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub elevation: Option<f64>,
    pub shape: Shape,
}

impl Placemark {
    pub fn new(shape: Shape) -> Self {
        Self {
            name: None,
            description: None,
            time: None,
            elevation: None,
            shape,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Container {
        name: Option<String>,
        children: Vec<Feature>,
    },
    Placemark(Placemark),
}

/// Flatten a feature tree into canonical geometries, in document order.
///
/// Points become waypoints and polygons areas. Every line becomes its own
/// track, each carrying the placemark's name and description. Lines with
/// fewer than two positions and polygons without rings are dropped.
pub fn flatten(features: Vec<Feature>, source: GeometrySource) -> Vec<CanonicalGeometry> {
    let mut out = Vec::new();
    for feature in features {
        flatten_into(feature, source, &mut out);
    }
    out
}

fn flatten_into(feature: Feature, source: GeometrySource, out: &mut Vec<CanonicalGeometry>) {
    match feature {
        Feature::Container { children, .. } => {
            for child in children {
                flatten_into(child, source, out);
            }
        }
        Feature::Placemark(placemark) => {
            let Placemark {
                name,
                description,
                time,
                elevation,
                shape,
            } = placemark;
            let template = Template {
                source,
                name,
                description,
                time,
                elevation,
            };
            emit(shape, &template, out);
        }
    }
}

/// Attributes copied onto every geometry derived from one placemark.
struct Template {
    source: GeometrySource,
    name: Option<String>,
    description: Option<String>,
    time: Option<DateTime<Utc>>,
    elevation: Option<f64>,
}

impl Template {
    fn build(&self, geom: Geometry) -> CanonicalGeometry {
        CanonicalGeometry::new(self.source, geom)
            .with_labels(self.name.clone(), self.description.clone())
    }
}

fn emit(shape: Shape, template: &Template, out: &mut Vec<CanonicalGeometry>) {
    match shape {
        Shape::Point(position) => {
            let mut doc = template.build(Geometry::Point(position));
            doc.timestamp = template.time;
            doc.elevation_m = template.elevation;
            out.push(doc);
        }
        Shape::Line(positions) => {
            if positions.len() >= 2 {
                out.push(template.build(Geometry::LineString(positions)));
            }
        }
        Shape::MultiLine(lines) => {
            for line in lines {
                emit(Shape::Line(line), template, out);
            }
        }
        Shape::Polygon(rings) => {
            let rings: Vec<Vec<Position>> = rings.into_iter().filter(|r| !r.is_empty()).collect();
            if !rings.is_empty() {
                out.push(template.build(Geometry::Polygon(rings)));
            }
        }
        Shape::Multi(shapes) => {
            for shape in shapes {
                emit(shape, template, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use observation_shared::GeometryKind;

    fn named(name: &str, shape: Shape) -> Feature {
        let mut placemark = Placemark::new(shape);
        placemark.name = Some(name.to_string());
        Feature::Placemark(placemark)
    }

    #[test]
    fn test_nested_containers_are_flattened_in_order() {
        let tree = vec![Feature::Container {
            name: Some("Hunt".into()),
            children: vec![
                named("stand", Shape::Point([-93.0, 44.0])),
                Feature::Container {
                    name: Some("Trails".into()),
                    children: vec![named(
                        "ridge",
                        Shape::Line(vec![[-93.0, 44.0], [-93.1, 44.1]]),
                    )],
                },
            ],
        }];

        let docs = flatten(tree, GeometrySource::Kml);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name.as_deref(), Some("stand"));
        assert_eq!(docs[0].kind(), GeometryKind::Waypoint);
        assert_eq!(docs[1].name.as_deref(), Some("ridge"));
        assert_eq!(docs[1].kind(), GeometryKind::Track);
    }

    #[test]
    fn test_multi_line_yields_one_track_per_segment() {
        let tree = vec![named(
            "morning walk",
            Shape::MultiLine(vec![
                vec![[-93.0, 44.0], [-93.1, 44.1]],
                vec![],
                vec![[-93.2, 44.2], [-93.3, 44.3], [-93.4, 44.4]],
            ]),
        )];

        let docs = flatten(tree, GeometrySource::Gpx);
        assert_eq!(docs.len(), 2);
        assert!(docs
            .iter()
            .all(|d| d.name.as_deref() == Some("morning walk")));
    }

    #[test]
    fn test_multi_geometry_and_empty_shapes() {
        let tree = vec![named(
            "field",
            Shape::Multi(vec![
                Shape::Point([-93.0, 44.0]),
                Shape::Polygon(vec![]),
                Shape::Line(vec![[-93.0, 44.0]]),
                Shape::Polygon(vec![vec![
                    [-93.0, 44.0],
                    [-93.1, 44.0],
                    [-93.1, 44.1],
                    [-93.0, 44.0],
                ]]),
            ]),
        )];

        let kinds: Vec<GeometryKind> = flatten(tree, GeometrySource::Kml)
            .iter()
            .map(CanonicalGeometry::kind)
            .collect();
        assert_eq!(kinds, vec![GeometryKind::Waypoint, GeometryKind::Area]);
    }

    #[test]
    fn test_single_point_lines_are_skipped() {
        let tree = vec![
            named("lone fix", Shape::Line(vec![[-93.0, 44.0]])),
            named(
                "broken walk",
                Shape::MultiLine(vec![
                    vec![[-93.0, 44.0]],
                    vec![[-93.2, 44.2], [-93.3, 44.3]],
                ]),
            ),
        ];

        let docs = flatten(tree, GeometrySource::Gpx);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name.as_deref(), Some("broken walk"));
        assert_eq!(
            docs[0].geom,
            Geometry::LineString(vec![[-93.2, 44.2], [-93.3, 44.3]])
        );
    }

    #[test]
    fn test_point_keeps_time_and_elevation() {
        let mut placemark = Placemark::new(Shape::Point([-93.0, 44.0]));
        placemark.elevation = Some(312.5);
        placemark.time = DateTime::parse_from_rfc3339("2024-10-03T06:00:00Z")
            .ok()
            .map(|t| t.with_timezone(&Utc));

        let docs = flatten(vec![Feature::Placemark(placemark)], GeometrySource::Gpx);
        assert_eq!(docs[0].elevation_m, Some(312.5));
        assert!(docs[0].timestamp.is_some());
    }
}
