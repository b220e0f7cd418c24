use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Query keys of a provider-side bounding box filter.
pub const BBOX_KEYS: [&str; 4] = ["lamin", "lamax", "lomin", "lomax"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Query pairs in `lamin, lamax, lomin, lomax` order, 6 decimal digits each.
    pub fn query_pairs(&self) -> [(&'static str, String); 4] {
        [
            (BBOX_KEYS[0], format!("{:.6}", self.lat_min)),
            (BBOX_KEYS[1], format!("{:.6}", self.lat_max)),
            (BBOX_KEYS[2], format!("{:.6}", self.lon_min)),
            (BBOX_KEYS[3], format!("{:.6}", self.lon_max)),
        ]
    }
}

/// Great-circle distance in meters.
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Box around `center` covering `radius_m * scale` in every direction.
///
/// Longitude degrees shrink towards the poles, so the meters-per-degree figure
/// is floored at `1e-6` to keep the longitude span finite at |lat| = 90.
pub fn compute_bbox(center: GeoPoint, radius_m: f64, scale: f64) -> BoundingBox {
    let effective = radius_m * scale;
    let lat_delta = effective / METERS_PER_DEGREE;
    let lon_m_per_deg = (center.lat.to_radians().cos().abs() * METERS_PER_DEGREE).max(1e-6);
    let lon_delta = effective / lon_m_per_deg;
    BoundingBox {
        lat_min: center.lat - lat_delta,
        lat_max: center.lat + lat_delta,
        lon_min: center.lon - lon_delta,
        lon_max: center.lon + lon_delta,
    }
}
