//! GPX reader.
//!
//! Waypoints become point placemarks; tracks become multi-line placemarks
//! with one line per `trkseg`; routes become single-line placemarks.

use observation_shared::{timestamp::parse_rfc3339, Position};
use quick_xml::events::BytesStart;

use crate::errors::GeometryParseError;
use crate::geometry::feature::{Feature, Placemark, Shape};
use crate::geometry::xml::{attribute, position, walk, ElementHandler};

/// Parse a GPX document into features.
pub fn parse(bytes: &[u8]) -> Result<Vec<Feature>, GeometryParseError> {
    let mut reader = GpxReader::default();
    walk(bytes, "gpx", &mut reader)?;
    Ok(reader.features)
}

/// Top-level feature being read.
enum Draft {
    Waypoint(Placemark),
    Track {
        placemark: Placemark,
        segments: Vec<Vec<Position>>,
    },
    Route {
        placemark: Placemark,
        points: Vec<Position>,
    },
}

impl Draft {
    fn placemark_mut(&mut self) -> &mut Placemark {
        match self {
            Draft::Waypoint(p) => p,
            Draft::Track { placemark, .. } | Draft::Route { placemark, .. } => placemark,
        }
    }

    fn finish(self) -> Placemark {
        match self {
            Draft::Waypoint(p) => p,
            Draft::Track {
                mut placemark,
                segments,
            } => {
                placemark.shape = Shape::MultiLine(segments);
                placemark
            }
            Draft::Route {
                mut placemark,
                points,
            } => {
                placemark.shape = Shape::Line(points);
                placemark
            }
        }
    }
}

#[derive(Default)]
struct GpxReader {
    features: Vec<Feature>,
    draft: Option<Draft>,
}

fn point_of(element: &BytesStart<'_>) -> Result<Position, GeometryParseError> {
    let lat = attribute(element, "lat")?
        .ok_or_else(|| GeometryParseError::invalid_coordinate("missing lat attribute"))?;
    let lon = attribute(element, "lon")?
        .ok_or_else(|| GeometryParseError::invalid_coordinate("missing lon attribute"))?;
    position(&lat, &lon)
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

impl ElementHandler for GpxReader {
    fn open(
        &mut self,
        name: &str,
        element: &BytesStart<'_>,
        _ancestors: &[String],
    ) -> Result<(), GeometryParseError> {
        match (name, self.draft.as_mut()) {
            ("wpt", None) => {
                let point = point_of(element)?;
                self.draft = Some(Draft::Waypoint(Placemark::new(Shape::Point(point))));
            }
            ("trk", None) => {
                self.draft = Some(Draft::Track {
                    placemark: Placemark::new(Shape::MultiLine(Vec::new())),
                    segments: Vec::new(),
                });
            }
            ("rte", None) => {
                self.draft = Some(Draft::Route {
                    placemark: Placemark::new(Shape::Line(Vec::new())),
                    points: Vec::new(),
                });
            }
            ("trkseg", Some(Draft::Track { segments, .. })) => segments.push(Vec::new()),
            ("trkpt", Some(Draft::Track { segments, .. })) => {
                let point = point_of(element)?;
                match segments.last_mut() {
                    Some(segment) => segment.push(point),
                    // a trkpt outside any trkseg still belongs to the track
                    None => segments.push(vec![point]),
                }
            }
            ("rtept", Some(Draft::Route { points, .. })) => points.push(point_of(element)?),
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
            "wpt" | "trk" | "rte" if ancestors.len() == 1 => {
                if let Some(draft) = self.draft.take() {
                    self.features.push(Feature::Placemark(draft.finish()));
                }
            }
            "name" | "desc" | "time" | "ele" => {
                // Only attributes of the feature itself; trkpt/rtept children are ignored.
                if !matches!(parent, Some("wpt" | "trk" | "rte")) {
                    return Ok(());
                }
                let Some(draft) = self.draft.as_mut() else {
                    return Ok(());
                };
                let placemark = draft.placemark_mut();
                match name {
                    "name" => placemark.name = non_empty(text),
                    "desc" => placemark.description = non_empty(text),
                    "time" => placemark.time = parse_rfc3339(text),
                    _ => {
                        placemark.elevation =
                            text.parse::<f64>().ok().filter(|e| e.is_finite())
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}
