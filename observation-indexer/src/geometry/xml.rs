//! Pull-parser plumbing shared by the GPX and KML readers.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::GeometryParseError;
use observation_shared::{GeoPoint, Position};

/// Callbacks for one document walk.
///
/// `ancestors` lists the local names of the open elements enclosing the
/// current one, outermost first; it never includes the element itself.
pub(crate) trait ElementHandler {
    fn open(
        &mut self,
        name: &str,
        element: &BytesStart<'_>,
        ancestors: &[String],
    ) -> Result<(), GeometryParseError>;

    fn close(
        &mut self,
        name: &str,
        text: &str,
        ancestors: &[String],
    ) -> Result<(), GeometryParseError>;
}

/// Walk a document, checking its root element and feeding every element to
/// `handler`. Element names are namespace-local (`gpx:trkpt` is `trkpt`).
pub(crate) fn walk(
    bytes: &[u8],
    expected_root: &'static str,
    handler: &mut impl ElementHandler,
) -> Result<(), GeometryParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut root_seen = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = local_name(&e);
                check_root(&mut root_seen, expected_root, &name)?;
                handler.open(&name, &e, &path)?;
                path.push(name);
                text.clear();
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                check_root(&mut root_seen, expected_root, &name)?;
                handler.open(&name, &e, &path)?;
                handler.close(&name, "", &path)?;
                text.clear();
            }
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::End(_) => {
                let name = path
                    .pop()
                    .ok_or_else(|| GeometryParseError::xml("unbalanced closing tag"))?;
                handler.close(&name, text.trim(), &path)?;
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !root_seen {
        return Err(GeometryParseError::UnexpectedRoot {
            expected: expected_root,
            found: String::new(),
        });
    }
    if let Some(open) = path.last() {
        return Err(GeometryParseError::xml(format!("unclosed element <{}>", open)));
    }
    Ok(())
}

fn check_root(
    root_seen: &mut bool,
    expected: &'static str,
    name: &str,
) -> Result<(), GeometryParseError> {
    if *root_seen {
        return Ok(());
    }
    if name != expected {
        return Err(GeometryParseError::UnexpectedRoot {
            expected,
            found: name.to_string(),
        });
    }
    *root_seen = true;
    Ok(())
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

/// Value of the attribute with the given local name.
pub(crate) fn attribute(
    element: &BytesStart<'_>,
    name: &str,
) -> Result<Option<String>, GeometryParseError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| GeometryParseError::xml(e.to_string()))?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Validate a latitude/longitude pair and return it as `[lon, lat]`.
pub(crate) fn position(lat: &str, lon: &str) -> Result<Position, GeometryParseError> {
    let parse = |raw: &str| raw.trim().parse::<f64>().ok();
    match (parse(lat), parse(lon)) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon)
            .map(|p| [p.lon, p.lat])
            .ok_or_else(|| {
                GeometryParseError::invalid_coordinate(format!("{}, {} out of range", lat, lon))
            }),
        _ => Err(GeometryParseError::invalid_coordinate(format!(
            "lat={:?} lon={:?}",
            lat, lon
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_validation() {
        assert_eq!(position("44.5", "-93.25").unwrap(), [-93.25, 44.5]);
        assert!(position("91", "0").is_err());
        assert!(position("abc", "0").is_err());
        assert!(position("NaN", "0").is_err());
    }
}
