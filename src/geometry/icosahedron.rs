//! The 12-vertex, 20-face icosahedron whose faces are the quadtree roots.

use super::tile::{Tile, surface_geodetic};
use geoquad_types::coord::{Ecef, Geodetic};
use once_cell::sync::Lazy;

const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

pub const NUM_VERTICES: usize = 12;
pub const NUM_FACES: usize = 20;
pub const NUM_EDGES: usize = 30;

static ICOSAHEDRON: Lazy<Icosahedron> = Lazy::new(Icosahedron::build);

/// Regular icosahedron inscribed in the unit sphere.
///
/// Vertices are unit directions. Faces are wound counter-clockwise when seen
/// from outside the sphere. Edges are stored with the lower vertex index first.
#[derive(Debug, Clone)]
pub struct Icosahedron {
    vertices: [Ecef; NUM_VERTICES],
    vertices_geodetic: [Geodetic; NUM_VERTICES],
    faces: [[usize; 3]; NUM_FACES],
    edges: [[usize; 2]; NUM_EDGES],
}

impl Icosahedron {
    /// The process-wide instance, built on first use.
    pub fn get() -> &'static Icosahedron {
        &ICOSAHEDRON
    }

    fn build() -> Self {
        let gr = GOLDEN_RATIO;
        let raw = [
            Ecef::new(-1.0, gr, 0.0),
            Ecef::new(1.0, gr, 0.0),
            Ecef::new(-1.0, -gr, 0.0),
            Ecef::new(1.0, -gr, 0.0),
            Ecef::new(0.0, -1.0, gr),
            Ecef::new(0.0, 1.0, gr),
            Ecef::new(0.0, -1.0, -gr),
            Ecef::new(0.0, 1.0, -gr),
            Ecef::new(gr, 0.0, -1.0),
            Ecef::new(gr, 0.0, 1.0),
            Ecef::new(-gr, 0.0, -1.0),
            Ecef::new(-gr, 0.0, 1.0),
        ];

        // Unnormalized edge length is exactly 2.
        let adjacent = |i: usize, j: usize| (raw[i].distance_squared(&raw[j]) - 4.0).abs() < 1e-9;

        let mut edges = [[0usize; 2]; NUM_EDGES];
        let mut ne = 0;
        for i in 0..NUM_VERTICES {
            for j in (i + 1)..NUM_VERTICES {
                if adjacent(i, j) {
                    if ne < NUM_EDGES {
                        edges[ne] = [i, j];
                    }
                    ne += 1;
                }
            }
        }
        debug_assert_eq!(ne, NUM_EDGES);

        let vertices = raw.map(|v| v.normalized());

        let mut faces = [[0usize; 3]; NUM_FACES];
        let mut nf = 0;
        for i in 0..NUM_VERTICES {
            for j in (i + 1)..NUM_VERTICES {
                if !adjacent(i, j) {
                    continue;
                }
                for k in (j + 1)..NUM_VERTICES {
                    if !(adjacent(i, k) && adjacent(j, k)) {
                        continue;
                    }
                    let face = if vertices[i].cross(&vertices[j]).dot(&vertices[k]) > 0.0 {
                        [i, j, k]
                    } else {
                        [i, k, j]
                    };
                    if nf < NUM_FACES {
                        faces[nf] = face;
                    }
                    nf += 1;
                }
            }
        }
        debug_assert_eq!(nf, NUM_FACES);

        Self {
            vertices_geodetic: vertices.map(|v| surface_geodetic(&v)),
            vertices,
            faces,
            edges,
        }
    }

    pub const fn num_vertices(&self) -> usize {
        NUM_VERTICES
    }

    pub const fn num_faces(&self) -> usize {
        NUM_FACES
    }

    pub const fn num_edges(&self) -> usize {
        NUM_EDGES
    }

    /// Unit direction of vertex `iv`.
    pub fn vertex(&self, iv: usize) -> Option<&Ecef> {
        self.vertices.get(iv)
    }

    pub fn vertex_geodetic(&self, iv: usize) -> Option<&Geodetic> {
        self.vertices_geodetic.get(iv)
    }

    pub fn face(&self, iface: usize) -> Option<[usize; 3]> {
        self.faces.get(iface).copied()
    }

    pub fn edge(&self, ie: usize) -> Option<[usize; 2]> {
        self.edges.get(ie).copied()
    }

    /// Index of the edge joining `iv0` and `iv1`, in either order.
    ///
    /// Returns `None` when the vertices are not adjacent.
    pub fn get_edge(&self, iv0: usize, iv1: usize) -> Option<usize> {
        let key = if iv0 > iv1 { [iv1, iv0] } else { [iv0, iv1] };
        self.edges.iter().position(|e| *e == key)
    }

    /// Midpoint of edge `ie`, re-projected onto the unit sphere.
    pub fn get_mid_point(&self, ie: usize) -> Option<Ecef> {
        let [a, b] = self.edge(ie)?;
        Some(super::sphere_midpoint(&self.vertices[a], &self.vertices[b]))
    }

    /// Tile of face `iface`, vertices in face order.
    pub fn face_tile(&self, iface: usize) -> Option<Tile> {
        let [a, b, c] = self.face(iface)?;
        Some(Tile::new([
            self.vertices_geodetic[a],
            self.vertices_geodetic[b],
            self.vertices_geodetic[c],
        ]))
    }

    /// Tiles of all 20 faces, indexed by face.
    pub fn root_tiles(&self) -> Vec<Tile> {
        (0..NUM_FACES).filter_map(|i| self.face_tile(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let ico = Icosahedron::get();
        assert_eq!(ico.num_vertices(), 12);
        assert_eq!(ico.num_faces(), 20);
        assert_eq!(ico.num_edges(), 30);

        // Every vertex touches 5 edges and 5 faces.
        for iv in 0..NUM_VERTICES {
            let edge_degree = ico.edges.iter().filter(|e| e.contains(&iv)).count();
            let face_degree = ico.faces.iter().filter(|f| f.contains(&iv)).count();
            assert_eq!(edge_degree, 5);
            assert_eq!(face_degree, 5);
        }
    }

    #[test]
    fn test_vertices_on_unit_sphere() {
        let ico = Icosahedron::get();
        for iv in 0..NUM_VERTICES {
            let v = ico.vertex(iv).unwrap();
            assert!((v.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_faces_wound_outward() {
        let ico = Icosahedron::get();
        for iface in 0..NUM_FACES {
            let [a, b, c] = ico.face(iface).unwrap();
            let (a, b, c) = (ico.vertices[a], ico.vertices[b], ico.vertices[c]);
            assert!(a.cross(&b).dot(&c) > 0.0);
        }
    }

    #[test]
    fn test_get_edge_order_independent() {
        let ico = Icosahedron::get();
        let [a, b] = ico.edge(7).unwrap();
        assert_eq!(ico.get_edge(a, b), Some(7));
        assert_eq!(ico.get_edge(b, a), Some(7));
    }

    #[test]
    fn test_get_edge_not_adjacent() {
        let ico = Icosahedron::get();
        // A vertex and its antipode are never adjacent.
        let v0 = ico.vertex(0).unwrap();
        let antipode = (0..NUM_VERTICES)
            .find(|&i| ico.vertex(i).unwrap().dot(v0) < -0.99)
            .unwrap();
        assert_eq!(ico.get_edge(0, antipode), None);
        assert_eq!(ico.get_edge(0, 0), None);
        assert_eq!(ico.get_edge(0, 99), None);
    }

    #[test]
    fn test_mid_point_on_sphere() {
        let ico = Icosahedron::get();
        for ie in 0..NUM_EDGES {
            let m = ico.get_mid_point(ie).unwrap();
            assert!((m.norm() - 1.0).abs() < 1e-12);

            let [a, b] = ico.edge(ie).unwrap();
            let da = m.angle_to(ico.vertex(a).unwrap());
            let db = m.angle_to(ico.vertex(b).unwrap());
            assert!((da - db).abs() < 1e-12);
        }
        assert!(ico.get_mid_point(NUM_EDGES).is_none());
    }

    #[test]
    fn test_root_tiles_cover_sphere() {
        let ico = Icosahedron::get();
        let tiles = ico.root_tiles();
        assert_eq!(tiles.len(), 20);

        for lat in (-80..=80).step_by(20) {
            for lon in (-180..180).step_by(30) {
                let p = Geodetic::surface(lat as f64, lon as f64).to_ecef();
                let hits = tiles.iter().filter(|t| t.margin(&p) > 1e-9).count();
                let near = tiles.iter().filter(|t| t.contains(&p)).count();
                assert!(near >= 1, "({lat}, {lon}) not covered");
                assert!(hits <= 1, "({lat}, {lon}) strictly inside {hits} tiles");
            }
        }
    }
}
