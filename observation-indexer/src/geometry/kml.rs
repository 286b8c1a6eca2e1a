//! KML reader.
//!
//! `Document` and `Folder` become containers, `Placemark` becomes a leaf.
//! Supported geometries are `Point`, `LineString`, `Polygon` (outer boundary
//! first, then holes) and `MultiGeometry` holding any of them.

use observation_shared::{timestamp::parse_rfc3339, Position};
use quick_xml::events::BytesStart;
use tracing::debug;

use crate::errors::GeometryParseError;
use crate::geometry::feature::{Feature, Placemark, Shape};
use crate::geometry::xml::{position, walk, ElementHandler};

/// Parse a KML document into a feature tree.
pub fn parse(bytes: &[u8]) -> Result<Vec<Feature>, GeometryParseError> {
    let mut reader = KmlReader::default();
    walk(bytes, "kml", &mut reader)?;
    Ok(reader.features)
}

/// Parse a `<coordinates>` body: whitespace-separated `lon,lat[,alt]` tuples.
pub fn parse_coordinates(text: &str) -> Result<Vec<Position>, GeometryParseError> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            match (parts.next(), parts.next()) {
                (Some(lon), Some(lat)) => position(lat, lon),
                _ => Err(GeometryParseError::invalid_coordinate(format!(
                    "coordinate tuple {:?}",
                    tuple
                ))),
            }
        })
        .collect()
}

/// Geometry element being read.
enum ShapeDraft {
    Point(Option<Position>),
    Line(Vec<Position>),
    Polygon {
        outer: Option<Vec<Position>>,
        inner: Vec<Vec<Position>>,
    },
    Multi(Vec<Shape>),
}

impl ShapeDraft {
    fn finish(self) -> Result<Shape, GeometryParseError> {
        Ok(match self {
            ShapeDraft::Point(Some(p)) => Shape::Point(p),
            ShapeDraft::Point(None) => {
                return Err(GeometryParseError::invalid_coordinate(
                    "Point without coordinates",
                ))
            }
            ShapeDraft::Line(positions) => Shape::Line(positions),
            ShapeDraft::Polygon { outer, inner } => match outer {
                Some(outer) => Shape::Polygon(std::iter::once(outer).chain(inner).collect()),
                // holes without an outer boundary describe nothing
                None => Shape::Polygon(Vec::new()),
            },
            ShapeDraft::Multi(shapes) => Shape::Multi(shapes),
        })
    }
}

struct PlacemarkDraft {
    name: Option<String>,
    description: Option<String>,
    time: Option<chrono::DateTime<chrono::Utc>>,
    shape: Option<Shape>,
    open_shapes: Vec<ShapeDraft>,
}

#[derive(Default)]
struct KmlReader {
    features: Vec<Feature>,
    /// Open `Document`/`Folder` elements, innermost last.
    containers: Vec<(Option<String>, Vec<Feature>)>,
    placemark: Option<PlacemarkDraft>,
}

impl KmlReader {
    fn push_feature(&mut self, feature: Feature) {
        match self.containers.last_mut() {
            Some((_, children)) => children.push(feature),
            None => self.features.push(feature),
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

impl ElementHandler for KmlReader {
    fn open(
        &mut self,
        name: &str,
        _element: &BytesStart<'_>,
        _ancestors: &[String],
    ) -> Result<(), GeometryParseError> {
        if let Some(placemark) = self.placemark.as_mut() {
            let draft = match name {
                "Point" => ShapeDraft::Point(None),
                "LineString" => ShapeDraft::Line(Vec::new()),
                "Polygon" => ShapeDraft::Polygon {
                    outer: None,
                    inner: Vec::new(),
                },
                "MultiGeometry" => ShapeDraft::Multi(Vec::new()),
                _ => return Ok(()),
            };
            placemark.open_shapes.push(draft);
            return Ok(());
        }

        match name {
            "Document" | "Folder" => self.containers.push((None, Vec::new())),
            "Placemark" => {
                self.placemark = Some(PlacemarkDraft {
                    name: None,
                    description: None,
                    time: None,
                    shape: None,
                    open_shapes: Vec::new(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn close(
        &mut self,
        name: &str,
        text: &str,
        ancestors: &[String],
    ) -> Result<(), GeometryParseError> {
        let parent = ancestors.last().map(String::as_str);

        match name {
            "name" | "description" => match (parent, self.placemark.as_mut()) {
                (Some("Placemark"), Some(placemark)) => {
                    if name == "name" {
                        placemark.name = non_empty(text);
                    } else {
                        placemark.description = non_empty(text);
                    }
                }
                (Some("Document" | "Folder"), None) if name == "name" => {
                    if let Some((container_name, _)) = self.containers.last_mut() {
                        *container_name = non_empty(text);
                    }
                }
                _ => {}
            },
            "when" => {
                if let (Some("TimeStamp"), Some(placemark)) = (parent, self.placemark.as_mut()) {
                    placemark.time = parse_rfc3339(text);
                }
            }
            "coordinates" => {
                let Some(placemark) = self.placemark.as_mut() else {
                    return Ok(());
                };
                let positions = parse_coordinates(text)?;
                match placemark.open_shapes.last_mut() {
                    Some(ShapeDraft::Point(point)) => *point = positions.first().copied(),
                    Some(ShapeDraft::Line(line)) => line.extend(positions),
                    Some(ShapeDraft::Polygon { outer, inner }) => {
                        // ancestors end with [.., outerBoundaryIs|innerBoundaryIs, LinearRing]
                        let boundary = ancestors
                            .len()
                            .checked_sub(2)
                            .and_then(|i| ancestors.get(i))
                            .map(String::as_str);
                        match boundary {
                            Some("outerBoundaryIs") => *outer = Some(positions),
                            Some("innerBoundaryIs") => inner.push(positions),
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
            "Point" | "LineString" | "Polygon" | "MultiGeometry" => {
                let Some(placemark) = self.placemark.as_mut() else {
                    return Ok(());
                };
                let Some(draft) = placemark.open_shapes.pop() else {
                    return Ok(());
                };
                let shape = draft.finish()?;
                match placemark.open_shapes.last_mut() {
                    Some(ShapeDraft::Multi(shapes)) => shapes.push(shape),
                    _ => placemark.shape = Some(shape),
                }
            }
            "Placemark" => {
                if let Some(draft) = self.placemark.take() {
                    match draft.shape {
                        Some(shape) => self.push_feature(Feature::Placemark(Placemark {
                            name: draft.name,
                            description: draft.description,
                            time: draft.time,
                            elevation: None,
                            shape,
                        })),
                        None => debug!(name = ?draft.name, "Skipping placemark without geometry"),
                    }
                }
            }
            "Document" | "Folder" if self.placemark.is_none() => {
                if let Some((container_name, children)) = self.containers.pop() {
                    self.push_feature(Feature::Container {
                        name: container_name,
                        children,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLYGON_WITH_HOLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>Farm</name>
    <Placemark>
      <name>Food plot</name>
      <description><![CDATA[Clover <b>and</b> brassica]]></description>
      <Polygon>
        <outerBoundaryIs>
          <LinearRing>
            <coordinates>
              -93.0,44.0,0 -93.1,44.0,0 -93.1,44.1,0 -93.0,44.0,0
            </coordinates>
          </LinearRing>
        </outerBoundaryIs>
        <innerBoundaryIs>
          <LinearRing>
            <coordinates>-93.05,44.02 -93.06,44.02 -93.06,44.03 -93.05,44.02</coordinates>
          </LinearRing>
        </innerBoundaryIs>
      </Polygon>
    </Placemark>
  </Document>
</kml>"#;

    #[test]
    fn test_polygon_with_hole() {
        let features = parse(POLYGON_WITH_HOLE.as_bytes()).unwrap();
        assert_eq!(features.len(), 1);

        let Feature::Container { name, children } = &features[0] else {
            panic!("expected container");
        };
        assert_eq!(name.as_deref(), Some("Farm"));

        let Feature::Placemark(plot) = &children[0] else {
            panic!("expected placemark");
        };
        assert_eq!(plot.name.as_deref(), Some("Food plot"));
        assert_eq!(plot.description.as_deref(), Some("Clover <b>and</b> brassica"));
        match &plot.shape {
            Shape::Polygon(rings) => {
                assert_eq!(rings.len(), 2);
                assert_eq!(rings[0].len(), 4);
                assert_eq!(rings[0][0], [-93.0, 44.0]);
                assert_eq!(rings[1].len(), 4);
                assert_eq!(rings[1][0], [-93.05, 44.02]);
            }
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_nested_folders_and_multi_geometry() {
        let doc = r#"<kml:kml xmlns:kml="http://www.opengis.net/kml/2.2">
          <kml:Document>
            <kml:Folder>
              <kml:name>Stands</kml:name>
              <kml:Placemark>
                <kml:name>Oak</kml:name>
                <kml:TimeStamp><kml:when>2024-10-03T06:00:00Z</kml:when></kml:TimeStamp>
                <kml:Point><kml:coordinates>-93.2,44.5</kml:coordinates></kml:Point>
              </kml:Placemark>
            </kml:Folder>
            <kml:Placemark>
              <kml:name>Fence</kml:name>
              <kml:MultiGeometry>
                <kml:LineString><kml:coordinates>-93,44 -93.1,44.1</kml:coordinates></kml:LineString>
                <kml:Point><kml:coordinates>-93,44</kml:coordinates></kml:Point>
              </kml:MultiGeometry>
            </kml:Placemark>
            <kml:Placemark><kml:name>No geometry</kml:name></kml:Placemark>
          </kml:Document>
        </kml:kml>"#;

        let features = parse(doc.as_bytes()).unwrap();
        let Feature::Container { children, .. } = &features[0] else {
            panic!("expected document");
        };
        assert_eq!(children.len(), 2);

        let Feature::Container { name, children: stands } = &children[0] else {
            panic!("expected folder");
        };
        assert_eq!(name.as_deref(), Some("Stands"));
        let Feature::Placemark(oak) = &stands[0] else {
            panic!("expected placemark");
        };
        assert_eq!(oak.shape, Shape::Point([-93.2, 44.5]));
        assert!(oak.time.is_some());

        let Feature::Placemark(fence) = &children[1] else {
            panic!("expected placemark");
        };
        match &fence.shape {
            Shape::Multi(shapes) => assert_eq!(shapes.len(), 2),
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_parse_coordinates() {
        assert_eq!(
            parse_coordinates(" -93.0,44.0,120\n-93.1,44.1 ").unwrap(),
            vec![[-93.0, 44.0], [-93.1, 44.1]]
        );
        assert!(parse_coordinates("").unwrap().is_empty());
        assert!(parse_coordinates("-93.0").is_err());
        assert!(parse_coordinates("-93.0,95.0").is_err());
        assert!(parse_coordinates("west,north").is_err());
    }

    #[test]
    fn test_wrong_root_is_rejected() {
        assert!(matches!(
            parse(b"<gpx></gpx>"),
            Err(GeometryParseError::UnexpectedRoot { expected: "kml", .. })
        ));
    }

    #[test]
    fn test_point_without_coordinates_is_rejected() {
        let doc = "<kml><Placemark><Point></Point></Placemark></kml>";
        assert!(matches!(
            parse(doc.as_bytes()),
            Err(GeometryParseError::InvalidCoordinate(_))
        ));
    }
}
