//! Feature layers stored in tiles.
//!
//! The set of layer kinds is closed, so [`LayerData`] is an enum with one
//! variant per kind rather than a trait object. Adding a kind means adding a
//! [`LayerKind`] variant, a [`LayerData`] variant and its match arms.

mod coastline;
mod jpgis;

pub use coastline::CoastLine;

use crate::error::{MapError, Result};
use crate::geometry::Tile;
use geoquad_types::coord::{Ecef, Geodetic};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Category of map feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    CoastLine,
}

impl LayerKind {
    pub const ALL: [LayerKind; 1] = [LayerKind::CoastLine];

    /// Name used for on-disk file names.
    pub const fn name(&self) -> &'static str {
        match self {
            LayerKind::CoastLine => "CoastLine",
        }
    }

    pub(crate) const fn tag(&self) -> u8 {
        match self {
            LayerKind::CoastLine => 0,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerKind {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CoastLine" | "coast_line" => Ok(LayerKind::CoastLine),
            other => Err(MapError::InvalidInput(format!("unknown layer kind: {other}"))),
        }
    }
}

/// Feature payload of one layer kind within one tile.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    CoastLine(CoastLine),
}

impl LayerData {
    /// Empty instance of `kind`.
    pub fn create(kind: LayerKind) -> Self {
        match kind {
            LayerKind::CoastLine => LayerData::CoastLine(CoastLine::new()),
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            LayerData::CoastLine(_) => LayerKind::CoastLine,
        }
    }

    pub fn as_coast_line(&self) -> Option<&CoastLine> {
        match self {
            LayerData::CoastLine(c) => Some(c),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            LayerData::CoastLine(c) => c.is_empty(),
        }
    }

    /// Current byte footprint of the content.
    pub fn size(&self) -> usize {
        match self {
            LayerData::CoastLine(c) => c.size(),
        }
    }

    /// Minimum meaningful feature spacing in meters.
    pub fn resolution(&self) -> f64 {
        match self {
            LayerData::CoastLine(c) => c.resolution(),
        }
    }

    /// Radius of the bounding circle in meters.
    pub fn radius(&self) -> f64 {
        match self {
            LayerData::CoastLine(c) => c.radius(),
        }
    }

    /// Center of the bounding circle.
    pub fn center(&self) -> Geodetic {
        self.center_ecef().to_geodetic()
    }

    pub fn center_ecef(&self) -> Ecef {
        match self {
            LayerData::CoastLine(c) => c.center_ecef(),
        }
    }

    /// Whether the bounding circle may reach the query circle.
    ///
    /// Chord distances never exceed arc lengths, so this never rejects data
    /// that actually lies within `radius` meters of `center`.
    pub fn intersects_circle(&self, center: &Ecef, radius: f64) -> bool {
        if self.is_empty() {
            return false;
        }
        self.center_ecef().distance(center) <= radius + self.radius()
    }

    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            LayerData::CoastLine(c) => c.save(writer),
        }
    }

    /// Replace the content with what `reader` holds. Unchanged on error.
    pub fn load<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        match self {
            LayerData::CoastLine(c) => c.load(reader),
        }
    }

    /// Partition the content across `tiles`; one optional share per tile.
    pub fn split(&self, tiles: &[Tile]) -> Vec<Option<LayerData>> {
        match self {
            LayerData::CoastLine(c) => c
                .split(tiles)
                .into_iter()
                .map(|share| share.map(LayerData::CoastLine))
                .collect(),
        }
    }

    /// Absorb `other`, which must be of the same kind.
    pub fn merge(&mut self, other: LayerData) -> Result<()> {
        match (self, other) {
            (LayerData::CoastLine(mine), LayerData::CoastLine(theirs)) => {
                mine.merge(theirs);
                Ok(())
            }
        }
    }

    /// Lossily shrink the content until it fits `size_limit` bytes.
    ///
    /// Returns whether the limit was reached.
    pub fn reduce(&mut self, size_limit: usize) -> bool {
        match self {
            LayerData::CoastLine(c) => {
                while c.size() > size_limit {
                    let excess = c.size() - size_limit;
                    let n = excess.div_ceil(CoastLine::POINT_BYTES);
                    if c.try_reduce(n) == 0 {
                        break;
                    }
                }
                c.size() <= size_limit
            }
        }
    }

    /// Free the content, keeping the instance itself.
    pub fn release(&mut self) {
        match self {
            LayerData::CoastLine(c) => c.release(),
        }
    }
}

impl From<CoastLine> for LayerData {
    fn from(value: CoastLine) -> Self {
        LayerData::CoastLine(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LayerData {
        let mut coast = CoastLine::new();
        coast
            .add([
                Geodetic::surface(35.0, 139.0),
                Geodetic::surface(35.001, 139.001),
                Geodetic::surface(35.002, 139.0),
            ])
            .unwrap();
        coast.into()
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(LayerKind::CoastLine.name(), "CoastLine");
        assert_eq!("CoastLine".parse::<LayerKind>().unwrap(), LayerKind::CoastLine);
        assert_eq!("coast_line".parse::<LayerKind>().unwrap(), LayerKind::CoastLine);
        assert!("Roads".parse::<LayerKind>().is_err());
        assert_eq!(LayerKind::from_tag(0), Some(LayerKind::CoastLine));
        assert_eq!(LayerKind::from_tag(9), None);
    }

    #[test]
    fn test_factory() {
        let data = LayerData::create(LayerKind::CoastLine);
        assert_eq!(data.kind(), LayerKind::CoastLine);
        assert!(data.is_empty());
        assert_eq!(data.size(), 0);
    }

    #[test]
    fn test_intersects_circle() {
        let data = sample();
        let near = Geodetic::surface(35.001, 139.0).to_ecef();
        let far = Geodetic::surface(35.09, 139.0).to_ecef();
        assert!(data.intersects_circle(&near, 1.0));
        assert!(!data.intersects_circle(&far, 0.001));
        assert!(data.intersects_circle(&far, 20_000.0));
    }

    #[test]
    fn test_reduce_to_limit() {
        let mut coast = CoastLine::new();
        let line: Vec<Geodetic> = (0..100)
            .map(|i| Geodetic::surface(10.0 + i as f64 * 0.001, 20.0))
            .collect();
        coast.add(line).unwrap();
        let mut data = LayerData::from(coast);

        let limit = data.size() / 2;
        assert!(data.reduce(limit));
        assert!(data.size() <= limit);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_release_keeps_kind() {
        let mut data = sample();
        data.release();
        assert!(data.is_empty());
        assert_eq!(data.kind(), LayerKind::CoastLine);
        assert!(!data.intersects_circle(&Geodetic::surface(35.0, 139.0).to_ecef(), 1e6));
    }
}
