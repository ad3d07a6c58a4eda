//! Persistent geospatial tile database on an icosahedral quadtree.
//!
//! The sphere is covered by the 20 faces of an icosahedron; each face roots a
//! quadtree of spherical triangles that subdivide as layer data outgrows a
//! per-tile limit. Two least-recently-used lists bound the resident nodes and
//! the resident layer bytes, spilling the rest to disk.
//!
//! ```rust
//! use geoquad::{CoastLine, Geodetic, LayerKind, LayerLimits, MapDb};
//!
//! let dir = tempfile::tempdir()?;
//! let mut db = MapDb::builder()
//!     .storage_path(dir.path())
//!     .max_nodes(256)
//!     .max_total_layer_bytes(1 << 24)
//!     .layer_limits(LayerKind::CoastLine, LayerLimits::new(1 << 16, 1 << 24))
//!     .build()?;
//!
//! let mut coast = CoastLine::new();
//! coast.add([Geodetic::surface(35.0, 139.0), Geodetic::surface(35.002, 139.001)])?;
//! db.insert(coast.into())?;
//!
//! let near = db.request(&[LayerKind::CoastLine], &Geodetic::surface(35.0, 139.0), 1_000.0, 0.0)?;
//! for handle in &near[0] {
//!     let data = db.resolve(handle).expect("just requested");
//!     assert_eq!(data.kind(), LayerKind::CoastLine);
//! }
//! db.save()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod config;
pub mod db;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod lru;
pub mod storage;
pub mod tree;

pub use builder::MapDbBuilder;
pub use config::{Config, LayerLimits};
pub use db::MapDb;
#[cfg(feature = "sync")]
pub use db::{MaintenanceHandle, SyncMapDb};
pub use error::{MapError, Result};

pub use geoquad_types::coord::{EARTH_RADIUS_M, Ecef, Geodetic};
pub use geoquad_types::stats::MapStats;

pub use geometry::{Icosahedron, Tile};
pub use layer::{CoastLine, LayerData, LayerKind};
pub use tree::{LayerHandle, LayerId, Node, NodeId, RestructReport, SaveReport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{MapDb, MapDbBuilder, MapError, Result};

    pub use crate::{CoastLine, LayerData, LayerKind};

    pub use crate::{Config, LayerLimits};

    pub use crate::{Ecef, Geodetic, LayerHandle};

    #[cfg(feature = "sync")]
    pub use crate::SyncMapDb;

    pub use std::time::Duration;
}
