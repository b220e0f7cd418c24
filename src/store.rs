use std::sync::{Arc, RwLock};

use crate::model::AircraftRecord;

/// Current aircraft collection shared with the presentation side.
///
/// Writers swap the whole collection in one step, so a reader sees either the
/// previous cycle or the new one, never a mix.
#[derive(Clone, Debug)]
pub struct RecordStore {
    inner: Arc<RwLock<Arc<[AircraftRecord]>>>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        let empty: Arc<[AircraftRecord]> = Arc::from(Vec::new());
        Self {
            inner: Arc::new(RwLock::new(empty)),
        }
    }

    pub fn replace(&self, records: Vec<AircraftRecord>) {
        let next: Arc<[AircraftRecord]> = records.into();
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
    }

    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    pub fn snapshot(&self) -> Arc<[AircraftRecord]> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> Option<AircraftRecord> {
        self.snapshot().get(row).cloned()
    }

    pub fn field(&self, row: usize, field: RecordField) -> Option<FieldValue> {
        self.snapshot().get(row).map(|rec| field.value(rec))
    }
}

/// Per-record roles exposed to list views.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordField {
    Icao24,
    Callsign,
    Latitude,
    Longitude,
    Altitude,
    Speed,
    Heading,
    InZone,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl RecordField {
    pub const ALL: [RecordField; 8] = [
        RecordField::Icao24,
        RecordField::Callsign,
        RecordField::Latitude,
        RecordField::Longitude,
        RecordField::Altitude,
        RecordField::Speed,
        RecordField::Heading,
        RecordField::InZone,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RecordField::Icao24 => "icao24",
            RecordField::Callsign => "callsign",
            RecordField::Latitude => "latitude",
            RecordField::Longitude => "longitude",
            RecordField::Altitude => "altitude",
            RecordField::Speed => "speed",
            RecordField::Heading => "heading",
            RecordField::InZone => "inZone",
        }
    }

    #[cfg(test)]
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn value(self, rec: &AircraftRecord) -> FieldValue {
        match self {
            RecordField::Icao24 => FieldValue::Text(rec.icao24.clone()),
            RecordField::Callsign => FieldValue::Text(rec.callsign.clone()),
            RecordField::Latitude => FieldValue::Number(rec.latitude),
            RecordField::Longitude => FieldValue::Number(rec.longitude),
            RecordField::Altitude => FieldValue::Number(rec.altitude),
            RecordField::Speed => FieldValue::Number(rec.speed),
            RecordField::Heading => FieldValue::Number(rec.heading),
            RecordField::InZone => FieldValue::Flag(rec.in_zone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, RecordField, RecordStore};
    use crate::model::AircraftRecord;

    fn rec(icao: &str) -> AircraftRecord {
        AircraftRecord {
            icao24: icao.to_string(),
            callsign: "TEST1".to_string(),
            latitude: 1.5,
            in_zone: true,
            ..Default::default()
        }
    }

    #[test]
    fn replace_swaps_whole_collection() {
        let store = RecordStore::new();
        assert!(store.is_empty());
        store.replace(vec![rec("a"), rec("b")]);
        let before = store.snapshot();
        store.replace(vec![rec("c")]);
        assert_eq!(before.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().icao24, "c");
        assert!(store.get(1).is_none());
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn clones_share_contents() {
        let store = RecordStore::new();
        let view = store.clone();
        store.replace(vec![rec("a")]);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn field_projection() {
        let store = RecordStore::new();
        store.replace(vec![rec("a")]);
        assert_eq!(
            store.field(0, RecordField::Icao24),
            Some(FieldValue::Text("a".to_string()))
        );
        assert_eq!(
            store.field(0, RecordField::Latitude),
            Some(FieldValue::Number(1.5))
        );
        assert_eq!(store.field(0, RecordField::InZone), Some(FieldValue::Flag(true)));
        assert_eq!(store.field(3, RecordField::Icao24), None);
    }

    #[test]
    fn field_names_roundtrip() {
        for field in RecordField::ALL {
            assert_eq!(RecordField::from_name(field.name()), Some(field));
        }
        assert_eq!(RecordField::from_name("squawk"), None);
    }
}
