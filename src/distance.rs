//! Great-circle distance between two coordinates.

use crate::catalog::Coordinate;

/// Earth radius used by the haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6373.0;

/// Haversine distance in kilometres between two points given in degrees.
///
/// Symmetric, non-negative, and zero for identical points.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

impl Coordinate {
    /// Distance in kilometres from this coordinate to `other`.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        distance(*self, *other)
    }
}
