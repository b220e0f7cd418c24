//! Poll engine: timer, single-flight coordination and the
//! fetch -> auth -> parse -> detect pipeline.
//!
//! Everything that mutates engine state runs on one thread. Timer ticks,
//! commands from the handle and network completions from worker threads all
//! arrive through a single channel and are handled in order.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{Settings, MIN_REFRESH_MS};
use crate::error::{excerpt, FetchError, StatusMessage, TRANSPORT_EXCERPT};
use crate::flight::{RequestId, SingleFlight};
use crate::geo::GeoPoint;
use crate::intrusion::{IntrusionEvent, IntrusionTracker};
use crate::model::ZoneConfig;
use crate::net::{build_data_request, DataRequest, HttpReply, TokenRequest, Transport};
use crate::parser::{parse_states, Parsed};
use crate::store::RecordStore;
use crate::token::{TokenCompletion, TokenManager, TokenStatus};

pub const EMPTY_STATES_WARNING: &str =
    "provider returned states=null (zone empty or rate limited)";
const DROPPED_FETCH_SUFFIX: &str = "; pending aircraft fetch dropped";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Start,
    Stop,
    RefreshNow,
    Update(SettingChange),
    Shutdown,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SettingChange {
    ZoneCenter(GeoPoint),
    ZoneRadius(f64),
    ApiUrl(String),
    TokenUrl(String),
    BboxScale(f64),
    ClientId(String),
    ClientSecret(String),
    RefreshIntervalMs(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingKey {
    ZoneCenter,
    ZoneRadius,
    ApiUrl,
    TokenUrl,
    BboxScale,
    ClientId,
    ClientSecret,
    RefreshInterval,
}

#[derive(Debug)]
pub enum Event {
    Command(Command),
    DataFinished {
        id: RequestId,
        zone: ZoneConfig,
        reply: HttpReply,
    },
    TokenFinished {
        id: RequestId,
        reply: HttpReply,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Updated { count: usize },
    Cleared,
    Failed,
    /// The fetch waiting for a token was discarded because the token request failed.
    Dropped,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    RecordsReplaced { count: usize },
    Intrusion(IntrusionEvent),
    /// Last-error field changed. `None` means cleared.
    Status(Option<StatusMessage>),
    SettingChanged(SettingKey),
    CycleCompleted(CycleOutcome),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingToken,
    FetchInFlight,
}

pub struct PollEngine {
    settings: Settings,
    tokens: TokenManager,
    tracker: IntrusionTracker,
    store: RecordStore,
    data: SingleFlight,
    transport: Arc<dyn Transport>,
    events: Sender<Event>,
    notify: Sender<Notification>,
    next_tick: Option<Instant>,
    last_status: Option<StatusMessage>,
}

impl PollEngine {
    pub fn new(
        settings: Settings,
        transport: Arc<dyn Transport>,
        store: RecordStore,
        events: Sender<Event>,
        notify: Sender<Notification>,
    ) -> Self {
        Self {
            settings,
            tokens: TokenManager::new(),
            tracker: IntrusionTracker::new(),
            store,
            data: SingleFlight::new(),
            transport,
            events,
            notify,
            next_tick: None,
            last_status: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn last_status(&self) -> Option<&StatusMessage> {
        self.last_status.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn state(&self) -> EngineState {
        if self.data.is_active() {
            EngineState::FetchInFlight
        } else if self.tokens.is_requesting() && self.tokens.fetch_pending() {
            EngineState::AwaitingToken
        } else {
            EngineState::Idle
        }
    }

    /// Serves events until shutdown, firing timer ticks in between.
    pub fn run(mut self, rx: Receiver<Event>) {
        info!("poll engine started");
        loop {
            if let Some(deadline) = self.next_tick {
                let now = Instant::now();
                if now >= deadline {
                    self.on_timer(now);
                    continue;
                }
            }
            let event = match self.next_tick {
                Some(deadline) => {
                    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            if !self.handle(event) {
                break;
            }
        }
        info!("poll engine stopped");
    }

    /// Applies one event. Returns false on shutdown.
    pub fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Command(Command::Start) => self.start(),
            Event::Command(Command::Stop) => self.stop(),
            Event::Command(Command::RefreshNow) => self.run_cycle(),
            Event::Command(Command::Update(change)) => self.apply_change(change),
            Event::Command(Command::Shutdown) => return false,
            Event::DataFinished { id, zone, reply } => self.on_data_finished(id, zone, reply),
            Event::TokenFinished { id, reply } => self.on_token_finished(id, reply),
        }
        true
    }

    /// Fires the periodic cycle if the deadline has passed. The next deadline
    /// keeps its phase unless the engine fell behind by more than one
    /// interval.
    pub fn on_timer(&mut self, now: Instant) {
        let Some(deadline) = self.next_tick else {
            return;
        };
        if now < deadline {
            return;
        }
        let interval = self.settings.refresh_interval;
        let mut next = deadline + interval;
        if next <= now {
            next = now + interval;
        }
        self.next_tick = Some(next);
        self.run_cycle();
    }

    fn start(&mut self) {
        if self.next_tick.is_some() {
            return;
        }
        info!(
            "polling {} every {:?}",
            self.settings.api_url, self.settings.refresh_interval
        );
        self.next_tick = Some(Instant::now() + self.settings.refresh_interval);
        self.run_cycle();
    }

    fn stop(&mut self) {
        self.next_tick = None;
        self.data.take_pending();
        if let Some(id) = self.data.cancel() {
            info!("polling stopped, abandoning fetch {id}");
        } else {
            info!("polling stopped");
        }
    }

    fn run_cycle(&mut self) {
        if self.data.is_draining() {
            // the abandoned request is still on the wire; run once it returns
            self.data.defer();
            debug!("cycle deferred: abandoned fetch still outstanding");
            return;
        }
        if self.data.is_busy() {
            debug!("cycle skipped: fetch already in flight");
            return;
        }
        let settings = self.settings.clone();

        let bearer = match self.tokens.ensure_valid(&settings, now_ms()) {
            TokenStatus::Ready(token) => Some(token),
            TokenStatus::Skipped => None,
            TokenStatus::Pending { request } => {
                match request {
                    Some((id, req)) => self.dispatch_token(id, req),
                    None => debug!("cycle deferred: waiting for access token"),
                }
                return;
            }
        };

        let request = match build_data_request(&settings, bearer.as_deref()) {
            Ok(request) => request,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        let Some(id) = self.data.begin() else {
            return;
        };
        debug!("fetch {id} GET {}", request.url);
        self.dispatch_data(id, request, settings.zone);
    }

    fn dispatch_data(&self, id: RequestId, request: DataRequest, zone: ZoneConfig) {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        thread::spawn(move || {
            let reply = transport.get(&request);
            let _ = events.send(Event::DataFinished { id, zone, reply });
        });
    }

    fn dispatch_token(&self, id: RequestId, request: TokenRequest) {
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        thread::spawn(move || {
            let reply = transport.post_token(&request);
            let _ = events.send(Event::TokenFinished { id, reply });
        });
    }

    fn on_data_finished(&mut self, id: RequestId, zone: ZoneConfig, reply: HttpReply) {
        if !self.data.finish(id) {
            debug!("discarding completion of abandoned fetch {id}");
            if !self.data.is_busy() && self.data.take_pending() {
                self.run_cycle();
            }
            return;
        }

        if let Some(message) = reply.error {
            self.fail(FetchError::Transport {
                status: reply.status,
                message,
                excerpt: excerpt(&reply.body, TRANSPORT_EXCERPT),
            });
            return;
        }

        match parse_states(reply.status, &reply.body) {
            Ok(Parsed::States(records)) => {
                let update = self.tracker.update(records, &zone);
                let count = update.records.len();
                self.store.replace(update.records);
                debug!(
                    "fetch {id}: {count} aircraft, {} inside zone",
                    self.tracker.inside_count()
                );
                self.emit(Notification::RecordsReplaced { count });
                for intrusion in update.intrusions {
                    self.emit(Notification::Intrusion(intrusion));
                }
                self.set_status(None);
                self.emit(Notification::CycleCompleted(CycleOutcome::Updated { count }));
            }
            Ok(Parsed::Empty) => {
                self.store.clear();
                self.tracker.clear();
                warn!("fetch {id}: {EMPTY_STATES_WARNING}");
                self.emit(Notification::RecordsReplaced { count: 0 });
                self.set_status(Some(StatusMessage::warning(EMPTY_STATES_WARNING)));
                self.emit(Notification::CycleCompleted(CycleOutcome::Cleared));
            }
            Err(err) => self.fail(err),
        }
    }

    fn on_token_finished(&mut self, id: RequestId, reply: HttpReply) {
        match self.tokens.complete(id, &reply, now_ms()) {
            TokenCompletion::Stale => debug!("discarding stale token reply {id}"),
            TokenCompletion::Acquired { replay_fetch } => {
                self.set_status(None);
                if replay_fetch {
                    self.run_cycle();
                }
            }
            TokenCompletion::Failed {
                error,
                dropped_fetch,
            } => {
                let mut status = StatusMessage::from(&error);
                if dropped_fetch {
                    warn!("aircraft fetch dropped, next attempt on the next tick");
                    status.text.push_str(DROPPED_FETCH_SUFFIX);
                }
                self.set_status(Some(status));
                if dropped_fetch {
                    self.emit(Notification::CycleCompleted(CycleOutcome::Dropped));
                }
            }
        }
    }

    fn fail(&mut self, err: FetchError) {
        warn!("cycle failed: {err}");
        self.set_status(Some(StatusMessage::from(&err)));
        self.emit(Notification::CycleCompleted(CycleOutcome::Failed));
    }

    fn set_status(&mut self, status: Option<StatusMessage>) {
        if self.last_status == status {
            return;
        }
        self.last_status = status.clone();
        self.emit(Notification::Status(status));
    }

    fn emit(&self, notification: Notification) {
        let _ = self.notify.send(notification);
    }

    fn apply_change(&mut self, change: SettingChange) {
        let s = &mut self.settings;
        let key = match change {
            SettingChange::ZoneCenter(center) => {
                if s.zone.center == center {
                    return;
                }
                s.zone.center = center;
                SettingKey::ZoneCenter
            }
            SettingChange::ZoneRadius(radius) => {
                if nearly_equal(s.zone.radius_m, radius) {
                    return;
                }
                s.zone.radius_m = radius;
                SettingKey::ZoneRadius
            }
            SettingChange::ApiUrl(url) => {
                if s.api_url == url {
                    return;
                }
                s.api_url = url;
                SettingKey::ApiUrl
            }
            SettingChange::TokenUrl(url) => {
                if s.token_url == url {
                    return;
                }
                s.token_url = url;
                SettingKey::TokenUrl
            }
            SettingChange::BboxScale(scale) => {
                let scale = scale.max(0.0);
                if nearly_equal(s.zone.bbox_scale, scale) {
                    return;
                }
                s.zone.bbox_scale = scale;
                SettingKey::BboxScale
            }
            SettingChange::ClientId(id) => {
                if s.client_id == id {
                    return;
                }
                s.client_id = id;
                SettingKey::ClientId
            }
            SettingChange::ClientSecret(secret) => {
                if s.client_secret == secret {
                    return;
                }
                s.client_secret = secret;
                SettingKey::ClientSecret
            }
            SettingChange::RefreshIntervalMs(ms) => {
                let interval = Duration::from_millis(ms.max(MIN_REFRESH_MS));
                if s.refresh_interval == interval {
                    return;
                }
                s.refresh_interval = interval;
                if self.next_tick.is_some() {
                    self.next_tick = Some(Instant::now() + interval);
                }
                SettingKey::RefreshInterval
            }
        };
        debug!("setting changed: {key:?}");
        self.emit(Notification::SettingChanged(key));
    }
}

fn nearly_equal(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() * 1e12 <= a.abs().min(b.abs())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Owner-side handle of an engine running on its own thread.
pub struct EngineHandle {
    tx: Sender<Event>,
    join: Option<JoinHandle<()>>,
}

pub fn spawn_engine(
    settings: Settings,
    transport: Arc<dyn Transport>,
    store: RecordStore,
    notify: Sender<Notification>,
) -> EngineHandle {
    let (tx, rx) = mpsc::channel();
    let engine = PollEngine::new(settings, transport, store, tx.clone(), notify);
    let join = thread::spawn(move || engine.run(rx));
    EngineHandle {
        tx,
        join: Some(join),
    }
}

impl EngineHandle {
    fn send(&self, command: Command) {
        if self.tx.send(Event::Command(command)).is_err() {
            debug!("engine thread gone, command dropped");
        }
    }

    pub fn start(&self) {
        self.send(Command::Start);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    pub fn refresh_now(&self) {
        self.send(Command::RefreshNow);
    }

    pub fn set_zone_center(&self, center: GeoPoint) {
        self.send(Command::Update(SettingChange::ZoneCenter(center)));
    }

    pub fn set_zone_radius_m(&self, radius_m: f64) {
        self.send(Command::Update(SettingChange::ZoneRadius(radius_m)));
    }

    pub fn set_api_url(&self, url: impl Into<String>) {
        self.send(Command::Update(SettingChange::ApiUrl(url.into())));
    }

    pub fn set_token_url(&self, url: impl Into<String>) {
        self.send(Command::Update(SettingChange::TokenUrl(url.into())));
    }

    pub fn set_bbox_scale(&self, scale: f64) {
        self.send(Command::Update(SettingChange::BboxScale(scale)));
    }

    pub fn set_client_id(&self, id: impl Into<String>) {
        self.send(Command::Update(SettingChange::ClientId(id.into())));
    }

    pub fn set_client_secret(&self, secret: impl Into<String>) {
        self.send(Command::Update(SettingChange::ClientSecret(secret.into())));
    }

    pub fn set_refresh_interval_ms(&self, ms: u64) {
        self.send(Command::Update(SettingChange::RefreshIntervalMs(ms)));
    }

    pub fn shutdown(mut self) {
        self.join_engine();
    }

    fn join_engine(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.tx.send(Event::Command(Command::Shutdown));
            if join.join().is_err() {
                warn!("engine thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.join_engine();
    }
}
