use crate::models::location::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn degrees_to_radians(degrees: f64) -> f64 {
    degrees * (std::f64::consts::PI / 180.0)
}

pub fn radians_to_degrees(radians: f64) -> f64 {
    radians * (180.0 / std::f64::consts::PI)
}

/// Great-circle distance between two points in kilometres.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = degrees_to_radians(a.lat);
    let lat2 = degrees_to_radians(b.lat);
    let delta_lat = degrees_to_radians(b.lat - a.lat);
    let delta_lng = degrees_to_radians(b.lng - a.lng);

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().atan2((1.0 - haversine).max(0.0).sqrt());

    EARTH_RADIUS_KM * central_angle
}

/// Moves `from` towards `to` by at most `step_degrees` in planar lat/lng space.
/// Returns `None` once the remaining offset is within one step.
pub fn step_towards(from: &GeoPoint, to: &GeoPoint, step_degrees: f64) -> Option<GeoPoint> {
    let d_lat = to.lat - from.lat;
    let d_lng = to.lng - from.lng;
    let offset = (d_lat * d_lat + d_lng * d_lng).sqrt();

    if offset <= step_degrees {
        return None;
    }

    Some(GeoPoint {
        lat: from.lat + (d_lat / offset) * step_degrees,
        lng: from.lng + (d_lng / offset) * step_degrees,
    })
}
