use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::{broadcast, RwLock};

use crate::db::Db;
use crate::reading::SensorReading;
use crate::remote::RemoteStore;
use crate::source::SourceSelector;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

/// Capacity of the update fan-out channel. A subscriber that lags behind by
/// more than this loses the oldest updates, never the newest.
const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// Minimum spacing between persisted readings.
const PERSIST_MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Default target temperature until an operator sets one.
pub const DEFAULT_TARGET_TEMPERATURE: f64 = 4.0;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<FridgeState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct FridgeState {
    pub started_at: Instant,
    /// Result of the startup connectivity probe; never re-validated.
    pub remote_available: bool,
    /// Latest reading slot, written only by the freshness poller.
    pub latest: Option<SensorReading>,
    pub target_temperature: f64,
    pub events: VecDeque<SystemEvent>,
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Poller,
    Control,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON snapshot (what the stats API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StateSnapshot {
    pub uptime_secs: u64,
    pub remote_available: bool,
    pub latest: Option<SensorReading>,
    pub target_temperature: f64,
    pub events: Vec<SystemEvent>,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl FridgeState {
    pub fn new(target_temperature: f64) -> Self {
        Self {
            started_at: Instant::now(),
            remote_available: false,
            latest: None,
            target_temperature,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record a fresh reading into the latest slot.
    pub fn record_latest(&mut self, reading: SensorReading) {
        self.latest = Some(reading);
    }

    /// Record a poller lifecycle event.
    pub fn record_poller(&mut self, detail: String) {
        self.push_event(EventKind::Poller, detail);
    }

    /// Record a control command event.
    pub fn record_control(&mut self, detail: String) {
        self.push_event(EventKind::Control, detail);
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable snapshot (newest events first).
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            remote_available: self.remote_available,
            latest: self.latest.clone(),
            target_temperature: self.target_temperature,
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ---------------------------------------------------------------------------
// Application context
// ---------------------------------------------------------------------------

/// Everything the handlers, the poller, and the control path share. Built once
/// in main and passed down explicitly.
pub struct AppContext {
    pub state: SharedState,
    pub db: Db,
    /// Present only when the store is configured and the startup probe passed.
    pub remote: Option<Arc<RemoteStore>>,
    pub selector: SourceSelector,
    updates: broadcast::Sender<SensorReading>,
    persist_gate: std::sync::Mutex<Option<Instant>>,
}

impl AppContext {
    pub fn new(
        state: SharedState,
        db: Db,
        remote: Option<Arc<RemoteStore>>,
        selector: SourceSelector,
    ) -> Arc<Self> {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Arc::new(Self {
            state,
            db,
            remote,
            selector,
            updates,
            persist_gate: std::sync::Mutex::new(None),
        })
    }

    /// One independent receiver per subscriber; each sees every update
    /// published after it subscribed (minus anything it lagged past).
    pub fn subscribe(&self) -> broadcast::Receiver<SensorReading> {
        self.updates.subscribe()
    }

    /// Publish an update to all subscribers. Never blocks; with no
    /// subscribers the update is simply dropped.
    pub fn publish(&self, reading: SensorReading) {
        let _ = self.updates.send(reading);
    }

    /// Best-effort persistence, throttled to one row per window so a 2-3 s
    /// device cadence does not flood the database.
    pub async fn maybe_persist(&self, reading: &SensorReading) -> anyhow::Result<()> {
        {
            let mut gate = self.persist_gate.lock().expect("persist gate poisoned");
            if let Some(last) = *gate {
                if last.elapsed() < PERSIST_MIN_INTERVAL {
                    return Ok(());
                }
            }
            *gate = Some(Instant::now());
        }

        let target = self.state.read().await.target_temperature;
        self.db
            .insert_reading(reading.last_update.unix_timestamp(), reading, target)
            .await
    }
}

// ===========================================================================
// Tests
// ===========================================================================
