/// Great-circle distance and bounding-box helpers.
///
/// Geospatial queries run in two stages: a latitude/longitude degree
/// window narrows the candidate set in SQL, then the exact Haversine
/// distance filters and ranks in Rust. The window may contain points
/// outside the radius; the Haversine pass is what guarantees the radius
/// contract.

use crate::model::GeoPoint;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers between two WGS84 coordinates,
/// by the Haversine formula.
///
/// Symmetric, zero for identical coordinates. Inputs are plain degrees
/// and are not validated; out-of-range values are the caller's problem.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Distance in kilometers between two points.
pub fn distance_between_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    distance_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

// ---------------------------------------------------------------------------
// Bounding box prefilter
// ---------------------------------------------------------------------------

/// A latitude/longitude window used as an SQL prefilter for radius
/// queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Window around `center` containing every point within
    /// `radius_meters`.
    ///
    /// Near the poles the longitude window degrades to the full range.
    /// The window is clamped to [-180, 180] and does not wrap the
    /// antimeridian, so a query centered within `radius_meters` of
    /// longitude ±180 can miss candidates on the far side — acceptable
    /// for the service's inland coverage.
    pub fn around(center: &GeoPoint, radius_meters: f64) -> Self {
        let radius_km = radius_meters / 1000.0;
        let lat_delta = (radius_km / EARTH_RADIUS_KM).to_degrees();

        let lat_cos = center.latitude.to_radians().cos();
        let lon_delta = if lat_cos.abs() < 1e-6 {
            // At the pole every longitude is within any radius
            180.0
        } else {
            ((radius_km / (EARTH_RADIUS_KM * lat_cos.abs())).to_degrees()).min(180.0)
        };

        // Once the window wraps the whole parallel there is no longitude
        // constraint left to apply.
        let (min_lon, max_lon) = if lon_delta >= 180.0 {
            (-180.0, 180.0)
        } else {
            (
                (center.longitude - lon_delta).max(-180.0),
                (center.longitude + lon_delta).min(180.0),
            )
        };

        BoundingBox {
            min_lat: (center.latitude - lat_delta).max(-90.0),
            max_lat: (center.latitude + lat_delta).min(90.0),
            min_lon,
            max_lon,
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lon
            && point.longitude <= self.max_lon
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
