//! # geoquad-types
//!
//! Core coordinate and statistics types for the geoquad tile database.
//!
//! - **Coordinates**: [`coord::Geodetic`] (latitude/longitude/altitude) and
//!   [`coord::Ecef`] (Earth-centered, Earth-fixed Cartesian), with explicit
//!   conversions between the two on a spherical Earth model.
//! - **Statistics**: [`stats::MapStats`], a snapshot of residency and I/O counters.
//!
//! ## Examples
//!
//! ```rust
//! use geoquad_types::coord::Geodetic;
//!
//! let tokyo = Geodetic::new(35.68, 139.77, 0.0);
//! let ecef = tokyo.to_ecef();
//! let back = ecef.to_geodetic();
//! assert!((back.lat - tokyo.lat).abs() < 1e-9);
//! ```

pub mod coord;
pub mod stats;

pub use coord::{EARTH_RADIUS_M, Ecef, Geodetic};
pub use stats::MapStats;
