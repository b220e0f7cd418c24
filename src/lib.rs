//! Polls a flight-tracking API for aircraft states and reports aircraft that
//! enter a circular no-fly zone.

pub mod config;
pub mod engine;
pub mod error;
pub mod flight;
pub mod geo;
pub mod intrusion;
pub mod logging;
pub mod model;
pub mod net;
pub mod parser;
pub mod store;
pub mod token;

pub use config::{Config, Settings};
pub use engine::{spawn_engine, CycleOutcome, EngineHandle, Notification, PollEngine};
pub use error::{FetchError, Severity, StatusMessage};
pub use geo::GeoPoint;
pub use intrusion::IntrusionEvent;
pub use model::{AircraftRecord, ZoneConfig};
pub use net::{ReqwestTransport, Transport};
pub use store::RecordStore;
