//! Spherical triangles and the tests used to prune quadtree descent.
//!
//! All tests are great-circle based. A point is inside a tile when it lies on
//! the inner side of the three great circles through the tile's edges.

use geoquad_types::coord::{EARTH_RADIUS_M, Ecef, Geodetic};
use std::f64::consts::PI;

/// Tolerance on the containment margin for points on a shared edge.
const CONTAINS_EPS: f64 = 1e-12;

/// Midpoint of two directions, normalized back onto the unit sphere.
pub fn sphere_midpoint(a: &Ecef, b: &Ecef) -> Ecef {
    (a.normalized() + b.normalized()).normalized()
}

/// Surface position (zero altitude) in the given direction.
pub(crate) fn surface_geodetic(direction: &Ecef) -> Geodetic {
    let g = direction.to_surface().to_geodetic();
    Geodetic::surface(g.lat, g.lon)
}

/// Angular distance from unit vector `p` to the minor great-circle arc `a`-`b`.
fn arc_distance(p: &Ecef, a: &Ecef, b: &Ecef) -> f64 {
    let n = a.cross(b);
    let nn = n.norm();
    if nn > 0.0 {
        let n = n * (1.0 / nn);
        let offset = p.dot(&n);
        let proj = *p - n * offset;
        if proj.norm() > 0.0 && a.cross(&proj).dot(&n) >= 0.0 && proj.cross(b).dot(&n) >= 0.0 {
            return offset.abs().clamp(0.0, 1.0).asin();
        }
    }
    p.angle_to(a).min(p.angle_to(b))
}

/// A triangular region of the sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    vertices: [Geodetic; 3],
    vertices_ecef: [Ecef; 3],
    /// Unit normals of the edge planes, pointing into the tile
    normals: [Ecef; 3],
}

impl Tile {
    pub fn new(vertices: [Geodetic; 3]) -> Self {
        let vertices_ecef = vertices.map(|v| v.to_ecef());
        let dirs = vertices_ecef.map(|v| v.normalized());
        let winding = if dirs[0].cross(&dirs[1]).dot(&dirs[2]) >= 0.0 {
            1.0
        } else {
            -1.0
        };
        let normals = [
            dirs[0].cross(&dirs[1]).normalized() * winding,
            dirs[1].cross(&dirs[2]).normalized() * winding,
            dirs[2].cross(&dirs[0]).normalized() * winding,
        ];
        Self {
            vertices,
            vertices_ecef,
            normals,
        }
    }

    /// Build a tile from three directions (any length) projected onto the surface.
    pub fn from_directions(directions: [Ecef; 3]) -> Self {
        Self::new(directions.map(|d| surface_geodetic(&d)))
    }

    pub fn vertices(&self) -> &[Geodetic; 3] {
        &self.vertices
    }

    pub fn vertices_ecef(&self) -> &[Ecef; 3] {
        &self.vertices_ecef
    }

    /// Surface point at the normalized vertex average.
    pub fn centroid(&self) -> Ecef {
        let [a, b, c] = self.vertices_ecef.map(|v| v.normalized());
        (a + b + c).to_surface()
    }

    /// Signed containment margin: positive inside, negative outside.
    ///
    /// It is the smallest sine of the angular distance from `point` to the
    /// three edge planes.
    pub fn margin(&self, point: &Ecef) -> f64 {
        let u = point.normalized();
        self.normals
            .iter()
            .map(|n| n.dot(&u))
            .fold(f64::INFINITY, f64::min)
    }

    /// Whether `point` lies inside the tile or on its border.
    pub fn contains(&self, point: &Ecef) -> bool {
        self.margin(point) >= -CONTAINS_EPS
    }

    /// Whether the spherical cap of `radius` meters around `center` touches the tile.
    pub fn intersects_circle(&self, center: &Ecef, radius: f64) -> bool {
        let angle = radius.max(0.0) / EARTH_RADIUS_M;
        if angle >= PI {
            return true;
        }
        let u = center.normalized();
        if self.contains(&u) {
            return true;
        }
        let [a, b, c] = self.vertices_ecef.map(|v| v.normalized());
        [(a, b), (b, c), (c, a)]
            .iter()
            .any(|(p, q)| arc_distance(&u, p, q) <= angle)
    }

    /// Quarter the tile by connecting its edge midpoints.
    ///
    /// Child `i < 3` keeps parent vertex `i` and the two midpoints adjacent to
    /// it; child 3 is the inner triangle of the three midpoints. Winding is
    /// preserved.
    pub fn subdivide(&self) -> [Tile; 4] {
        let [a, b, c] = self.vertices_ecef;
        let [ga, gb, gc] = self.vertices;
        let m01 = surface_geodetic(&sphere_midpoint(&a, &b));
        let m12 = surface_geodetic(&sphere_midpoint(&b, &c));
        let m20 = surface_geodetic(&sphere_midpoint(&c, &a));
        [
            Tile::new([ga, m01, m20]),
            Tile::new([m01, gb, m12]),
            Tile::new([m20, m12, gc]),
            Tile::new([m01, m12, m20]),
        ]
    }

    /// Index of the tile that best contains `point`.
    ///
    /// Points on shared borders go to exactly one tile, the one with the
    /// largest margin; ties resolve to the lowest index.
    pub fn locate(tiles: &[Tile], point: &Ecef) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, tile) in tiles.iter().enumerate() {
            let m = tile.margin(point);
            if best.is_none_or(|(_, bm)| m > bm) {
                best = Some((i, m));
            }
        }
        best.map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Icosahedron;

    fn tokyo_root() -> Tile {
        let p = Geodetic::surface(35.0, 139.0).to_ecef();
        let tiles = Icosahedron::get().root_tiles();
        let idx = Tile::locate(&tiles, &p).unwrap();
        tiles[idx].clone()
    }

    #[test]
    fn test_contains_centroid_not_antipode() {
        let tile = tokyo_root();
        let c = tile.centroid();
        assert!(tile.contains(&c));
        assert!(!tile.contains(&-c));
    }

    #[test]
    fn test_vertex_on_border() {
        let tile = tokyo_root();
        for v in tile.vertices_ecef() {
            assert!(tile.contains(v));
            assert!(tile.margin(v).abs() < 1e-9);
        }
    }

    #[test]
    fn test_circle_inside_and_far() {
        let tile = tokyo_root();
        let c = tile.centroid();
        assert!(tile.intersects_circle(&c, 1.0));
        assert!(!tile.intersects_circle(&-c, 1_000.0));
        // Half the circumference covers everything.
        assert!(tile.intersects_circle(&-c, PI * EARTH_RADIUS_M));
    }

    #[test]
    fn test_circle_touching_edge_from_outside() {
        let tile = tokyo_root();
        let [a, b, _] = tile.vertices_ecef().map(|v| v.normalized());
        let mid = sphere_midpoint(&a, &b);
        // Step ~10 km outward across edge a-b.
        let outward = -(a.cross(&b).normalized());
        let outward = if tile.normals[0].dot(&outward) < 0.0 {
            outward
        } else {
            -outward
        };
        let step = 10_000.0 / EARTH_RADIUS_M;
        let outside = (mid + outward * step).normalized();
        assert!(!tile.contains(&outside));
        assert!(!tile.intersects_circle(&outside, 5_000.0));
        assert!(tile.intersects_circle(&outside, 15_000.0));
    }

    #[test]
    fn test_subdivide_vertices_partition() {
        let tile = tokyo_root();
        let children = tile.subdivide();

        // Parent corners appear once each, midpoints three times each.
        let parent = tile.vertices();
        for (i, corner) in parent.iter().enumerate() {
            let uses = children
                .iter()
                .flat_map(|c| c.vertices().iter())
                .filter(|v| *v == corner)
                .count();
            assert_eq!(uses, 1);
            assert_eq!(&children[i].vertices()[i], corner);
        }
        for mid in children[3].vertices() {
            let uses = children
                .iter()
                .flat_map(|c| c.vertices().iter())
                .filter(|v| *v == mid)
                .count();
            assert_eq!(uses, 3);
        }
    }

    #[test]
    fn test_subdivide_matches_icosahedron_midpoints() {
        let ico = Icosahedron::get();
        let [ia, ib, _] = ico.face(0).unwrap();
        let tile = ico.face_tile(0).unwrap();
        let children = tile.subdivide();
        let expected = ico.get_mid_point(ico.get_edge(ia, ib).unwrap()).unwrap();
        let got = children[0].vertices_ecef()[1].normalized();
        assert!(got.distance(&expected) < 1e-9);
    }

    #[test]
    fn test_children_cover_parent() {
        let tile = tokyo_root();
        let children = tile.subdivide();
        let [a, b, c] = tile.vertices_ecef().map(|v| v.normalized());
        for (wa, wb) in [(0.2, 0.3), (0.6, 0.1), (0.33, 0.33), (0.05, 0.9)] {
            let p = (a * wa + b * wb + c * (1.0 - wa - wb)).normalized();
            assert!(tile.contains(&p));
            let idx = Tile::locate(&children, &p).unwrap();
            assert!(children[idx].contains(&p));
        }
    }

    #[test]
    fn test_locate_empty() {
        assert_eq!(Tile::locate(&[], &Ecef::new(1.0, 0.0, 0.0)), None);
    }
}
