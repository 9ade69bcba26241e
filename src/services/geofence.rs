//! Containment evaluation over circular safe zones
//!
//! Pure geospatial predicates: great-circle distance (haversine), zone
//! containment, and the spherical-cap test used by the nearby-alerts query.

use crate::domain::types::{GeoPoint, SafeZone, ZoneId};

/// Mean Earth radius in meters, used for great-circle distance
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// WGS84 equatorial radius in meters, used to convert a metric radius to an
/// angular radius for spherical-cap queries
pub const EARTH_EQUATORIAL_RADIUS_M: f64 = 6_378_137.0;

/// Great-circle distance between two points in meters (haversine formula)
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Ids of every zone whose circle contains the point.
/// An empty zone list yields an empty result.
pub fn containing_zones(point: GeoPoint, zones: &[SafeZone]) -> Vec<ZoneId> {
    zones
        .iter()
        .filter(|zone| haversine_m(point, zone.center) <= zone.radius_m)
        .map(|zone| zone.id)
        .collect()
}

/// True spherical-cap containment: is `point` within `radius_m` of `center`
/// on the sphere. The metric radius is converted to an angular radius so the
/// test stays correct at multi-kilometer scales.
pub fn within_cap(center: GeoPoint, point: GeoPoint, radius_m: f64) -> bool {
    let angular_radius = radius_m / EARTH_EQUATORIAL_RADIUS_M;
    central_angle(center, point) <= angular_radius
}

/// Central angle between two points in radians
fn central_angle(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}
