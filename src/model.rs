use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// One aircraft as reported by a single poll cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AircraftRecord {
    pub icao24: String,
    pub callsign: String,
    pub latitude: f64,
    pub longitude: f64,
    /// meters
    pub altitude: f64,
    /// meters/second
    pub speed: f64,
    /// degrees, 0-360
    pub heading: f64,
    pub in_zone: bool,
}

impl AircraftRecord {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Callsign when the transponder sent one, otherwise the icao24 address.
    pub fn display_name(&self) -> &str {
        if self.callsign.is_empty() {
            &self.icao24
        } else {
            &self.callsign
        }
    }
}

/// Circular geofence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub center: GeoPoint,
    pub radius_m: f64,
    /// Multiplier applied to the radius when a provider needs a bounding box.
    pub bbox_scale: f64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            center: GeoPoint::new(39.9334, 32.8597),
            radius_m: 30_000.0,
            bbox_scale: 1.0,
        }
    }
}
