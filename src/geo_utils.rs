//! Geographic utilities: great-circle distance, rounding, miles.

use crate::LatLng;

/// Earth radius for `distance_from_home`, matching the server's figures.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres in one statute mile.
pub const KM_PER_MILE: f64 = 1.609344;

/// Great-circle distance between two points in kilometres (haversine).
pub fn haversine_km(a: &LatLng, b: &LatLng) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Convert miles to kilometres.
pub fn miles_to_km(miles: f64) -> f64 {
    miles * KM_PER_MILE
}
