//! Coastline layer: a set of polylines over the sphere.

use super::jpgis;
use crate::error::{MapError, Result};
use crate::geometry::Tile;
use crate::storage::codec::{read_f64, read_u32, write_f64, write_u32};
use geoquad_types::coord::{Ecef, Geodetic};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::mem::size_of;
use std::path::Path;

/// Stored ECEF coordinates may drift from the derived ones by at most this, in meters.
const ECEF_TOLERANCE_M: f64 = 1e-3;

/// Upper bound for capacity hints taken from untrusted counts.
const MAX_PREALLOC: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq)]
struct Line {
    pts: Vec<Geodetic>,
    pts_ecef: Vec<Ecef>,
}

impl Line {
    fn size(&self) -> usize {
        size_of::<u32>() + CoastLine::POINT_BYTES * self.pts.len()
    }
}

/// Coastline polylines with derived summary statistics.
///
/// Every point is held both as a [`Geodetic`] position and as its derived
/// [`Ecef`] vector. After any mutation the minimum spacing, bounding radius and
/// centroid are recomputed, so [`resolution`](Self::resolution),
/// [`radius`](Self::radius) and [`center_ecef`](Self::center_ecef) are always
/// current.
///
/// # Examples
///
/// ```
/// use geoquad::{CoastLine, Geodetic};
///
/// let mut coast = CoastLine::new();
/// coast.add([Geodetic::surface(35.0, 139.0), Geodetic::surface(35.01, 139.0)])?;
/// assert_eq!(coast.num_lines(), 1);
/// assert!(coast.resolution() > 1_000.0);
/// # Ok::<(), geoquad::MapError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoastLine {
    lines: Vec<Line>,
    total_size: usize,
    dist_min: f64,
    pt_radius: f64,
    pt_center: Ecef,
}

impl CoastLine {
    /// Bytes accounted per point (geodetic plus ECEF form).
    pub const POINT_BYTES: usize = size_of::<Geodetic>() + size_of::<Ecef>();

    pub fn new() -> Self {
        Self::default()
    }

    /// Build from several polylines at once.
    pub fn from_lines<I, L>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = Geodetic>,
    {
        let mut coast = Self::new();
        for line in lines {
            coast.push_line(validated(line)?);
        }
        coast.update_properties();
        Ok(coast)
    }

    /// Append a polyline, deriving its ECEF points. Empty lines are ignored.
    pub fn add<L: IntoIterator<Item = Geodetic>>(&mut self, line: L) -> Result<()> {
        let pts = validated(line)?;
        self.push_line(pts);
        self.update_properties();
        Ok(())
    }

    fn push_line(&mut self, pts: Vec<Geodetic>) {
        if pts.is_empty() {
            return;
        }
        let pts_ecef = pts.iter().map(Geodetic::to_ecef).collect();
        self.push_derived(pts, pts_ecef);
    }

    fn push_derived(&mut self, pts: Vec<Geodetic>, pts_ecef: Vec<Ecef>) {
        debug_assert_eq!(pts.len(), pts_ecef.len());
        if pts.is_empty() {
            return;
        }
        self.lines.push(Line { pts, pts_ecef });
    }

    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn num_points(&self) -> usize {
        self.lines.iter().map(|l| l.pts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Geodetic points of line `id`; empty for an unknown line.
    pub fn points(&self, id: usize) -> &[Geodetic] {
        self.lines.get(id).map(|l| l.pts.as_slice()).unwrap_or(&[])
    }

    /// ECEF points of line `id`; empty for an unknown line.
    pub fn points_ecef(&self, id: usize) -> &[Ecef] {
        self.lines.get(id).map(|l| l.pts_ecef.as_slice()).unwrap_or(&[])
    }

    pub fn lines(&self) -> impl Iterator<Item = &[Geodetic]> + '_ {
        self.lines.iter().map(|l| l.pts.as_slice())
    }

    pub fn size(&self) -> usize {
        self.total_size
    }

    /// Smallest distance between consecutive points, in meters.
    ///
    /// Zero when there is no segment at all.
    pub fn resolution(&self) -> f64 {
        self.dist_min
    }

    pub fn radius(&self) -> f64 {
        self.pt_radius
    }

    pub fn center(&self) -> Geodetic {
        self.pt_center.to_geodetic()
    }

    pub fn center_ecef(&self) -> Ecef {
        self.pt_center
    }

    /// Recompute byte size, minimum spacing, centroid and bounding radius.
    pub fn update_properties(&mut self) {
        self.total_size = self.lines.iter().map(Line::size).sum();

        let count = self.num_points();
        if count == 0 {
            self.dist_min = 0.0;
            self.pt_radius = 0.0;
            self.pt_center = Ecef::default();
            return;
        }

        let sum = self
            .lines
            .iter()
            .flat_map(|l| l.pts_ecef.iter())
            .fold(Ecef::default(), |acc, p| acc + *p);
        self.pt_center = if sum.norm() > 0.0 {
            sum.to_surface()
        } else {
            // Points balanced around the Earth's center.
            self.lines[0].pts_ecef[0].to_surface()
        };

        let center = self.pt_center;
        self.pt_radius = self
            .lines
            .iter()
            .flat_map(|l| l.pts_ecef.iter())
            .map(|p| p.distance(&center))
            .fold(0.0, f64::max);

        let dist_min = self
            .lines
            .iter()
            .flat_map(|l| l.pts_ecef.windows(2))
            .map(|w| w[0].distance(&w[1]))
            .fold(f64::INFINITY, f64::min);
        self.dist_min = if dist_min.is_finite() { dist_min } else { 0.0 };
    }

    /// Remove up to `nred` points, closest-spaced interior points first.
    ///
    /// This is a lossy simplification. When interior points run out, whole
    /// lines that fit in the remaining budget are dropped, shortest first,
    /// then end points are trimmed. Never removes more than `nred`; returns
    /// how many points were removed.
    pub fn try_reduce(&mut self, nred: usize) -> usize {
        if nred == 0 {
            return 0;
        }

        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (li, line) in self.lines.iter().enumerate() {
            for pi in 1..line.pts_ecef.len().saturating_sub(1) {
                let spacing = line.pts_ecef[pi - 1].distance(&line.pts_ecef[pi]);
                candidates.push((spacing, li, pi));
            }
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let drop: HashSet<(usize, usize)> = candidates
            .iter()
            .take(nred)
            .map(|&(_, li, pi)| (li, pi))
            .collect();
        let mut removed = drop.len();

        for (li, line) in self.lines.iter_mut().enumerate() {
            if !drop.iter().any(|&(l, _)| l == li) {
                continue;
            }
            let mut pi = 0;
            line.pts.retain(|_| {
                let keep = !drop.contains(&(li, pi));
                pi += 1;
                keep
            });
            let mut pi = 0;
            line.pts_ecef.retain(|_| {
                let keep = !drop.contains(&(li, pi));
                pi += 1;
                keep
            });
        }

        while removed < nred {
            let budget = nred - removed;
            let shortest = self
                .lines
                .iter()
                .enumerate()
                .min_by_key(|(_, l)| l.pts.len())
                .map(|(i, l)| (i, l.pts.len()));
            let Some((i, len)) = shortest else { break };
            if len <= budget {
                self.lines.remove(i);
                removed += len;
            } else {
                let line = &mut self.lines[i];
                line.pts.truncate(len - budget);
                line.pts_ecef.truncate(len - budget);
                removed += budget;
            }
        }

        self.update_properties();
        removed
    }

    /// Append every line of `other`.
    pub fn merge(&mut self, other: CoastLine) {
        for line in other.lines {
            self.push_derived(line.pts, line.pts_ecef);
        }
        self.update_properties();
    }

    /// Drop all content.
    pub fn release(&mut self) {
        self.lines = Vec::new();
        self.update_properties();
    }

    /// Partition the lines across `tiles`.
    ///
    /// Each point goes to the tile that best contains it; consecutive points
    /// in the same tile stay together as one polyline.
    pub fn split(&self, tiles: &[Tile]) -> Vec<Option<CoastLine>> {
        let mut shares: Vec<CoastLine> = (0..tiles.len()).map(|_| CoastLine::new()).collect();

        for line in &self.lines {
            let mut run: Option<(usize, Vec<Geodetic>, Vec<Ecef>)> = None;
            for (pt, ecef) in line.pts.iter().zip(&line.pts_ecef) {
                let Some(tile) = Tile::locate(tiles, ecef) else {
                    continue;
                };
                match run.as_mut() {
                    Some((t, pts, ecefs)) if *t == tile => {
                        pts.push(*pt);
                        ecefs.push(*ecef);
                    }
                    _ => {
                        if let Some((t, pts, ecefs)) = run.take() {
                            shares[t].push_derived(pts, ecefs);
                        }
                        run = Some((tile, vec![*pt], vec![*ecef]));
                    }
                }
            }
            if let Some((t, pts, ecefs)) = run {
                shares[t].push_derived(pts, ecefs);
            }
        }

        shares
            .into_iter()
            .map(|mut share| {
                if share.is_empty() {
                    None
                } else {
                    share.update_properties();
                    Some(share)
                }
            })
            .collect()
    }

    /// Write line count, then per line the point count and each point's
    /// geodetic and ECEF coordinates.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u32(writer, count_u32(self.lines.len())?)?;
        for line in &self.lines {
            write_u32(writer, count_u32(line.pts.len())?)?;
            for (pt, ecef) in line.pts.iter().zip(&line.pts_ecef) {
                write_f64(writer, pt.lat)?;
                write_f64(writer, pt.lon)?;
                write_f64(writer, pt.alt)?;
                write_f64(writer, ecef.x)?;
                write_f64(writer, ecef.y)?;
                write_f64(writer, ecef.z)?;
            }
        }
        Ok(())
    }

    /// Replace the content with the lines read from `reader`.
    ///
    /// Stored ECEF points are checked against the ones derived from the
    /// geodetic points; a mismatch marks the record as corrupt.
    pub fn load<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let num_lines = read_u32(reader)? as usize;
        let mut lines = Vec::with_capacity(num_lines.min(MAX_PREALLOC));
        for _ in 0..num_lines {
            let num_pts = read_u32(reader)? as usize;
            let mut pts = Vec::with_capacity(num_pts.min(MAX_PREALLOC));
            let mut pts_ecef = Vec::with_capacity(num_pts.min(MAX_PREALLOC));
            for _ in 0..num_pts {
                let pt = Geodetic::new(read_f64(reader)?, read_f64(reader)?, read_f64(reader)?);
                let stored = Ecef::new(read_f64(reader)?, read_f64(reader)?, read_f64(reader)?);
                if !pt.is_valid() {
                    return Err(MapError::InvalidFormat(format!(
                        "coastline point out of range: {pt:?}"
                    )));
                }
                let derived = pt.to_ecef();
                if derived.distance(&stored) > ECEF_TOLERANCE_M {
                    return Err(MapError::InvalidFormat(
                        "coastline ECEF point does not match its geodetic point".into(),
                    ));
                }
                pts.push(pt);
                pts_ecef.push(derived);
            }
            lines.push((pts, pts_ecef));
        }

        self.lines.clear();
        for (pts, pts_ecef) in lines {
            self.push_derived(pts, pts_ecef);
        }
        self.update_properties();
        Ok(())
    }

    /// Replace the content with the curves of a JPGIS coastline file.
    ///
    /// Both the GML `posList` and the `DirectPosition.coordinate` encodings
    /// are read, as "latitude longitude" pairs. Nothing changes on error.
    pub fn load_jpgis<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let parsed = Self::from_lines(jpgis::parse(&text)?)?;
        log::debug!(
            "loaded {} coastline curves from {}",
            parsed.num_lines(),
            path.as_ref().display()
        );
        *self = parsed;
        Ok(())
    }

    /// Build from GeoJSON `LineString`/`MultiLineString` geometries, bare or
    /// wrapped in features.
    #[cfg(feature = "geojson")]
    pub fn from_geojson(text: &str) -> Result<Self> {
        use geojson::GeoJson;

        let parsed: GeoJson = text
            .parse()
            .map_err(|e| MapError::InvalidFormat(format!("invalid GeoJSON: {e}")))?;

        let mut lines = Vec::new();
        match parsed {
            GeoJson::Geometry(geometry) => collect_geojson(&geometry.value, &mut lines)?,
            GeoJson::Feature(feature) => {
                if let Some(geometry) = feature.geometry {
                    collect_geojson(&geometry.value, &mut lines)?;
                }
            }
            GeoJson::FeatureCollection(collection) => {
                for feature in collection.features {
                    if let Some(geometry) = feature.geometry {
                        collect_geojson(&geometry.value, &mut lines)?;
                    }
                }
            }
        }
        Self::from_lines(lines)
    }
}

#[cfg(feature = "geojson")]
fn collect_geojson(value: &geojson::Value, out: &mut Vec<Vec<Geodetic>>) -> Result<()> {
    use geojson::Value;

    let position = |p: &Vec<f64>| -> Result<Geodetic> {
        match p.as_slice() {
            [lon, lat] => Ok(Geodetic::surface(*lat, *lon)),
            [lon, lat, alt, ..] => Ok(Geodetic::new(*lat, *lon, *alt)),
            _ => Err(MapError::InvalidFormat("GeoJSON position needs 2 or 3 values".into())),
        }
    };

    match value {
        Value::LineString(coords) => {
            out.push(coords.iter().map(position).collect::<Result<Vec<_>>>()?);
        }
        Value::MultiLineString(lines) => {
            for coords in lines {
                out.push(coords.iter().map(position).collect::<Result<Vec<_>>>()?);
            }
        }
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_geojson(&geometry.value, out)?;
            }
        }
        _ => {
            return Err(MapError::InvalidInput(
                "coastlines accept only line geometries".into(),
            ));
        }
    }
    Ok(())
}

fn validated<L: IntoIterator<Item = Geodetic>>(line: L) -> Result<Vec<Geodetic>> {
    let pts: Vec<Geodetic> = line.into_iter().collect();
    if let Some(bad) = pts.iter().find(|p| !p.is_valid()) {
        return Err(MapError::InvalidInput(format!("invalid coordinate: {bad:?}")));
    }
    Ok(pts)
}

fn count_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| MapError::InvalidInput(format!("count {n} exceeds u32")))
}
