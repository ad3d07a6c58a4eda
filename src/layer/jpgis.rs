//! Reader for JPGIS coastline curves (Japanese national geospatial GML).
//!
//! Only the geometry is extracted: every element whose local name ends in
//! `Curve` becomes one polyline, built from the coordinates found in its
//! `posList`, `pos` or `DirectPosition.coordinate` children. Composite
//! curves contribute through their innermost member curves.

use crate::error::{MapError, Result};
use geoquad_types::coord::Geodetic;
use quick_xml::Reader;
use quick_xml::events::Event;

fn invalid(msg: impl Into<String>) -> MapError {
    MapError::InvalidFormat(format!("JPGIS: {}", msg.into()))
}

fn is_curve_element(local: &[u8]) -> bool {
    local.ends_with(b"Curve")
}

fn is_coordinate_element(local: &[u8]) -> bool {
    matches!(
        local,
        b"posList" | b"pos" | b"coordinate" | b"DirectPosition.coordinate"
    )
}

fn push_coordinates(text: &str, out: &mut Vec<Geodetic>) -> Result<()> {
    let values = text
        .split_whitespace()
        .map(|t| t.parse::<f64>().map_err(|_| invalid(format!("bad number '{t}'"))))
        .collect::<Result<Vec<f64>>>()?;
    if values.len() % 2 != 0 {
        return Err(invalid("odd number of coordinate values"));
    }
    for pair in values.chunks_exact(2) {
        let pt = Geodetic::surface(pair[0], pair[1]);
        if !pt.is_valid() {
            return Err(invalid(format!("coordinate out of range: {} {}", pair[0], pair[1])));
        }
        out.push(pt);
    }
    Ok(())
}

/// Extract all curves of a JPGIS document as "lat lon" polylines.
pub(crate) fn parse(text: &str) -> Result<Vec<Vec<Geodetic>>> {
    let mut reader = Reader::from_str(text);
    let mut lines = Vec::new();
    // Open curves, innermost last.
    let mut curves: Vec<Vec<Geodetic>> = Vec::new();
    let mut coords: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let local = e.local_name();
                if is_curve_element(local.as_ref()) {
                    curves.push(Vec::new());
                } else if is_coordinate_element(local.as_ref()) && !curves.is_empty() {
                    coords = Some(String::new());
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(buf) = coords.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| invalid(format!("bad text: {err}")))?;
                    buf.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(buf) = coords.as_mut() {
                    let text = std::str::from_utf8(e)
                        .map_err(|err| invalid(format!("bad CDATA: {err}")))?;
                    buf.push_str(text);
                }
            }
            Ok(Event::End(ref e)) => {
                let local = e.local_name();
                if is_curve_element(local.as_ref()) {
                    let pts = curves.pop().ok_or_else(|| invalid("unbalanced curve end"))?;
                    if !pts.is_empty() {
                        lines.push(pts);
                    }
                } else if is_coordinate_element(local.as_ref())
                    && let Some(buf) = coords.take()
                    && let Some(pts) = curves.last_mut()
                {
                    push_coordinates(&buf, pts)?;
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(invalid(format!(
                    "XML error at byte {}: {err}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    if !curves.is_empty() {
        return Err(invalid("unterminated curve"));
    }
    if lines.is_empty() {
        return Err(invalid("no curves found"));
    }
    Ok(lines)
}
