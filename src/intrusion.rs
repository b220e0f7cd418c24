use std::collections::HashSet;

use tracing::info;

use crate::geo::haversine_meters;
use crate::model::{AircraftRecord, ZoneConfig};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntrusionEvent {
    pub display_name: String,
    pub icao24: String,
}

#[derive(Debug, Default)]
pub struct TrackerUpdate {
    pub records: Vec<AircraftRecord>,
    pub intrusions: Vec<IntrusionEvent>,
}

/// Edge-triggered geofence detector. An aircraft fires once when it appears
/// inside the zone and stays silent until it has been outside for a cycle.
#[derive(Debug, Default)]
pub struct IntrusionTracker {
    inside: HashSet<String>,
}

impl IntrusionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, mut records: Vec<AircraftRecord>, zone: &ZoneConfig) -> TrackerUpdate {
        let mut current = HashSet::with_capacity(records.len());
        let mut intrusions = Vec::new();

        for rec in &mut records {
            rec.in_zone = haversine_meters(rec.position(), zone.center) <= zone.radius_m;
            if !rec.in_zone {
                continue;
            }
            if current.insert(rec.icao24.clone()) && !self.inside.contains(&rec.icao24) {
                info!("intrusion {} ({})", rec.display_name(), rec.icao24);
                intrusions.push(IntrusionEvent {
                    display_name: rec.display_name().to_string(),
                    icao24: rec.icao24.clone(),
                });
            }
        }

        self.inside = current;
        TrackerUpdate {
            records,
            intrusions,
        }
    }

    pub fn clear(&mut self) {
        self.inside.clear();
    }

    #[cfg(test)]
    fn is_inside(&self, icao24: &str) -> bool {
        self.inside.contains(icao24)
    }

    pub fn inside_count(&self) -> usize {
        self.inside.len()
    }
}
