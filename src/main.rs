use anyhow::Result;
use std::sync::mpsc;
use std::sync::Arc;

use noflyzone::config::{parse_args, Settings};
use noflyzone::engine::{spawn_engine, CycleOutcome, Notification};
use noflyzone::logging::init as init_logging;
use noflyzone::net::ReqwestTransport;
use noflyzone::store::RecordStore;
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    let Some(config) = parse_args()? else {
        return Ok(());
    };
    let _log_guard = init_logging(&config);
    info!("noflyzone starting");
    debug!("config path: {}", config.config_path.display());

    let settings = Settings::from_config(&config);
    debug!("settings: {settings:?}");
    let transport = Arc::new(ReqwestTransport::new()?);
    let store = RecordStore::new();
    let (notify_tx, notify_rx) = mpsc::channel();

    let engine = spawn_engine(settings, transport, store.clone(), notify_tx);
    if config.once {
        engine.refresh_now();
    } else {
        engine.start();
    }

    for notification in notify_rx.iter() {
        match notification {
            Notification::Intrusion(event) => {
                println!("INTRUSION {} ({})", event.display_name, event.icao24);
            }
            Notification::Status(Some(status)) => println!("{status}"),
            Notification::Status(None) => {}
            Notification::RecordsReplaced { count } => {
                let inside = store.snapshot().iter().filter(|r| r.in_zone).count();
                println!("{count} aircraft, {inside} inside zone");
            }
            Notification::SettingChanged(key) => debug!("setting changed: {key:?}"),
            Notification::CycleCompleted(outcome) => {
                if outcome == CycleOutcome::Failed {
                    warn!("poll cycle failed");
                }
                if config.once {
                    break;
                }
            }
        }
    }

    engine.shutdown();
    info!("noflyzone exited");
    Ok(())
}
