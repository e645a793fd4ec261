//! Geographic primitives
//!
//! `GeoPoint` is the one coordinate type used across the crate. Its field order
//! is longitude first, and every constructor names the order it expects, so
//! callers coming from `[lng, lat]` arrays or `(lat, lng)` tuples convert at
//! the boundary instead of passing raw pairs around.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::EARTH_RADIUS_KM;

const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// A position on the globe in degrees, longitude first
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude in degrees, -180..=180
    pub longitude: f64,
    /// Latitude in degrees, -90..=90
    pub latitude: f64,
}

/// Coordinate validation failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("longitude {0} is outside -180..=180")]
    LongitudeOutOfRange(f64),

    #[error("latitude {0} is outside -90..=90")]
    LatitudeOutOfRange(f64),
}

impl GeoPoint {
    /// Create a point from longitude and latitude (in that order)
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Create a point from a GeoJSON-style `[longitude, latitude]` pair
    pub const fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }

    /// Create a point from latitude and longitude (map SDK region order)
    pub const fn from_lat_lng(latitude: f64, longitude: f64) -> Self {
        Self::new(longitude, latitude)
    }

    /// GeoJSON-style `[longitude, latitude]` pair
    pub const fn to_lng_lat(self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    /// Reject non-finite or out-of-range coordinates
    pub fn validate(&self) -> Result<(), GeoError> {
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GeoError::LongitudeOutOfRange(self.longitude));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(GeoError::LatitudeOutOfRange(self.latitude));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in kilometres
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(*self, *other)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.longitude, self.latitude)
    }
}

/// Great-circle distance between two points using the haversine formula.
///
/// The `atan2` form keeps antipodal points well defined: `a` is clamped to
/// `[0, 1]` so floating point drift never produces a NaN from `sqrt(1 - a)`.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude * DEG_TO_RAD;
    let lat2 = to.latitude * DEG_TO_RAD;
    let delta_lat = (to.latitude - from.latitude) * DEG_TO_RAD;
    let delta_lon = (to.longitude - from.longitude) * DEG_TO_RAD;

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIAMI: GeoPoint = GeoPoint::new(-80.19, 25.77);
    const NYC: GeoPoint = GeoPoint::new(-73.98, 40.75);

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(MIAMI.distance_km(&MIAMI), 0.0);
    }

    #[test]
    fn test_miami_to_nyc_is_about_1750_km() {
        let d = MIAMI.distance_km(&NYC);
        assert!((d - 1750.0).abs() < 25.0, "got {}", d);
    }

    #[test]
    fn test_distance_is_symmetric() {
        assert!((MIAMI.distance_km(&NYC) - NYC.distance_km(&MIAMI)).abs() < 1e-9);
    }

    #[test]
    fn test_antipodal_points_do_not_produce_nan() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(180.0, 0.0);
        let d = a.distance_km(&b);
        assert!(d.is_finite());
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM;
        assert!((d - half_circumference).abs() < 1e-6);

        let north = GeoPoint::new(10.0, 90.0);
        let south = GeoPoint::new(-170.0, -90.0);
        assert!(north.distance_km(&south).is_finite());
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0));
        assert!((d - 111.19).abs() < 0.1);
    }

    #[test]
    fn test_constructors_agree_on_order() {
        let a = GeoPoint::new(-80.19, 25.77);
        let b = GeoPoint::from_lng_lat([-80.19, 25.77]);
        let c = GeoPoint::from_lat_lng(25.77, -80.19);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.to_lng_lat(), [-80.19, 25.77]);
    }

    #[test]
    fn test_validate_rejects_out_of_range_latitude() {
        let bad = GeoPoint::new(-80.19, 125.77);
        assert_eq!(bad.validate(), Err(GeoError::LatitudeOutOfRange(125.77)));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).validate().is_err());
        assert!(GeoPoint::new(181.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_serializes_with_named_fields() {
        let json = serde_json::to_string(&MIAMI).unwrap();
        assert_eq!(json, r#"{"longitude":-80.19,"latitude":25.77}"#);
    }
}
