use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{excerpt, FetchError, PAYLOAD_EXCERPT, STATUS_EXCERPT};
use crate::model::AircraftRecord;

const STATES_KEY: &str = "states";
const MIN_STATE_FIELDS: usize = 11;

const IDX_ICAO24: usize = 0;
const IDX_CALLSIGN: usize = 1;
const IDX_LONGITUDE: usize = 5;
const IDX_LATITUDE: usize = 6;
const IDX_ALTITUDE: usize = 7;
const IDX_SPEED: usize = 9;
const IDX_HEADING: usize = 10;

/// Result of decoding a flight-state payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Parsed {
    /// Records in source order. `in_zone` is not yet evaluated.
    States(Vec<AircraftRecord>),
    /// `"states": null`: the provider returned nothing (empty area or rate limited).
    Empty,
}

pub fn parse_states(status: u16, body: &[u8]) -> Result<Parsed, FetchError> {
    if status >= 300 {
        return Err(FetchError::HttpStatus {
            status,
            excerpt: excerpt(body, STATUS_EXCERPT),
        });
    }

    let obj = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(obj)) => obj,
        _ => return Err(FetchError::schema("unexpected aircraft payload")),
    };

    match obj.get(STATES_KEY) {
        Some(Value::Array(states)) => Ok(Parsed::States(parse_state_vectors(states))),
        Some(Value::Null) => Ok(Parsed::Empty),
        _ => Err(unrecognized(&obj)),
    }
}

fn parse_state_vectors(states: &[Value]) -> Vec<AircraftRecord> {
    let mut records = Vec::with_capacity(states.len());
    let mut skipped = 0usize;
    for entry in states {
        match parse_state_vector(entry) {
            Some(rec) => records.push(rec),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("skipped {skipped} of {} state vectors", states.len());
    }
    records
}

fn parse_state_vector(entry: &Value) -> Option<AircraftRecord> {
    let fields = entry.as_array()?;
    if fields.len() < MIN_STATE_FIELDS {
        return None;
    }
    let longitude = number_at(fields, IDX_LONGITUDE)?;
    let latitude = number_at(fields, IDX_LATITUDE)?;
    if latitude.is_nan() || longitude.is_nan() {
        return None;
    }
    Some(AircraftRecord {
        icao24: text_at(fields, IDX_ICAO24),
        callsign: text_at(fields, IDX_CALLSIGN).trim().to_string(),
        latitude,
        longitude,
        altitude: number_at(fields, IDX_ALTITUDE).unwrap_or(0.0),
        speed: number_at(fields, IDX_SPEED).unwrap_or(0.0),
        heading: number_at(fields, IDX_HEADING).unwrap_or(0.0),
        in_zone: false,
    })
}

fn number_at(fields: &[Value], idx: usize) -> Option<f64> {
    fields.get(idx).and_then(Value::as_f64)
}

fn text_at(fields: &[Value], idx: usize) -> String {
    fields
        .get(idx)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn unrecognized(obj: &Map<String, Value>) -> FetchError {
    let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    let raw = serde_json::to_string(obj).unwrap_or_default();
    FetchError::schema(format!(
        "aircraft payload not recognized. keys=[{}] body={}",
        keys.join(","),
        excerpt(raw.as_bytes(), PAYLOAD_EXCERPT)
    ))
}
