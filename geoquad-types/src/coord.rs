//! Angular and Cartesian Earth coordinates.
//!
//! Geodetic positions are expressed in degrees (latitude, longitude) and
//! meters (altitude above the reference sphere). ECEF vectors are in meters.
//! The Earth is modelled as a sphere of radius [`EARTH_RADIUS_M`], which keeps
//! the two systems exactly convertible into each other.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Mean Earth radius in meters (IUGG), the same radius `geo`'s haversine uses.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A latitude/longitude/altitude position.
///
/// # Examples
///
/// ```
/// use geoquad_types::coord::Geodetic;
///
/// let p = Geodetic::new(35.0, 139.0, 0.0);
/// assert_eq!(p.lat, 35.0);
/// assert_eq!(p.lon, 139.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geodetic {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lon: f64,
    /// Altitude in meters above the reference sphere.
    pub alt: f64,
}

impl Geodetic {
    #[inline]
    pub const fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    /// A surface position (zero altitude).
    #[inline]
    pub const fn surface(lat: f64, lon: f64) -> Self {
        Self::new(lat, lon, 0.0)
    }

    /// Whether every component is finite and latitude lies in [-90, 90].
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.alt.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Convert to Earth-centered, Earth-fixed coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoquad_types::coord::{EARTH_RADIUS_M, Geodetic};
    ///
    /// let north_pole = Geodetic::new(90.0, 0.0, 0.0).to_ecef();
    /// assert!((north_pole.z - EARTH_RADIUS_M).abs() < 1e-6);
    /// ```
    pub fn to_ecef(&self) -> Ecef {
        let r = EARTH_RADIUS_M + self.alt;
        let (sin_lat, cos_lat) = self.lat.to_radians().sin_cos();
        let (sin_lon, cos_lon) = self.lon.to_radians().sin_cos();
        Ecef::new(r * cos_lat * cos_lon, r * cos_lat * sin_lon, r * sin_lat)
    }

    /// Great-circle distance along the surface to another position, in meters.
    ///
    /// Altitude is ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoquad_types::coord::Geodetic;
    ///
    /// let tokyo = Geodetic::surface(35.68, 139.77);
    /// let osaka = Geodetic::surface(34.69, 135.50);
    /// let d = tokyo.haversine_distance(&osaka);
    /// assert!(d > 390_000.0 && d < 410_000.0);
    /// ```
    #[inline]
    pub fn haversine_distance(&self, other: &Geodetic) -> f64 {
        use geo::Distance;
        geo::Haversine.distance(
            geo::Point::new(self.lon, self.lat),
            geo::Point::new(other.lon, other.lat),
        )
    }
}

/// An Earth-centered, Earth-fixed Cartesian vector in meters.
///
/// Also used for unit directions on the sphere, which is how tile vertices
/// are compared during containment tests.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Ecef {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Ecef {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(&self, other: &Ecef) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn cross(&self, other: &Ecef) -> Ecef {
        Ecef::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    #[inline]
    pub fn norm_squared(&self) -> f64 {
        self.dot(self)
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// Unit vector in the same direction. The zero vector is returned unchanged.
    pub fn normalized(&self) -> Ecef {
        let n = self.norm();
        if n > 0.0 { *self * (1.0 / n) } else { *self }
    }

    /// Squared straight-line distance.
    #[inline]
    pub fn distance_squared(&self, other: &Ecef) -> f64 {
        (*self - *other).norm_squared()
    }

    /// Straight-line (chord) distance in meters.
    #[inline]
    pub fn distance(&self, other: &Ecef) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Angle between the two vectors as seen from the Earth's center, in radians.
    pub fn angle_to(&self, other: &Ecef) -> f64 {
        self.cross(other).norm().atan2(self.dot(other))
    }

    /// Convert back to latitude/longitude/altitude.
    pub fn to_geodetic(&self) -> Geodetic {
        let r = self.norm();
        if r == 0.0 {
            return Geodetic::new(0.0, 0.0, -EARTH_RADIUS_M);
        }
        let lat = (self.z / r).clamp(-1.0, 1.0).asin().to_degrees();
        let lon = self.y.atan2(self.x).to_degrees();
        Geodetic::new(lat, lon, r - EARTH_RADIUS_M)
    }

    /// Project onto the reference sphere's surface along this direction.
    pub fn to_surface(&self) -> Ecef {
        self.normalized() * EARTH_RADIUS_M
    }
}

impl Add for Ecef {
    type Output = Ecef;

    fn add(self, rhs: Ecef) -> Ecef {
        Ecef::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Ecef {
    type Output = Ecef;

    fn sub(self, rhs: Ecef) -> Ecef {
        Ecef::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Ecef {
    type Output = Ecef;

    fn mul(self, rhs: f64) -> Ecef {
        Ecef::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Ecef {
    type Output = Ecef;

    fn neg(self) -> Ecef {
        Ecef::new(-self.x, -self.y, -self.z)
    }
}

impl From<Geodetic> for Ecef {
    fn from(value: Geodetic) -> Self {
        value.to_ecef()
    }
}

impl From<Ecef> for Geodetic {
    fn from(value: Ecef) -> Self {
        value.to_geodetic()
    }
}
