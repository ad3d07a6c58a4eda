//! Sphere geometry: the seeding icosahedron and triangular tiles.

mod icosahedron;
mod tile;

pub use icosahedron::Icosahedron;
pub use tile::{Tile, sphere_midpoint};
