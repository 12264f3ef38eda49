//! Ordered fallback chain over the available reading sources.
//!
//! Priority is remote store, then local hardware, then simulation. Each
//! provider either produces a normalized reading or declines; the simulation
//! tail always produces, so `get_reading` is total.

use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tracing::debug;

use crate::db::now_unix;
use crate::hardware::HardwareSensor;
use crate::reading::{SensorReading, Source};
use crate::remote::RemoteStore;

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

enum Provider {
    Remote(Arc<RemoteStore>),
    Hardware(HardwareSensor),
}

impl Provider {
    async fn try_read(&self) -> Option<SensorReading> {
        match self {
            Self::Remote(store) => store.fetch_latest().await,
            Self::Hardware(hal) => hal.read(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Hardware(_) => "hardware",
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Jitter applied to the last known temperature, in °C.
const TEMP_JITTER: f64 = 0.5;
/// Jitter applied to the last known humidity, in % RH.
const HUMIDITY_JITTER: f64 = 2.0;

/// Synthesizes plausible readings by jittering the last known values. The
/// baseline only moves when a real reading is observed.
pub struct SimulatedSensor {
    base: Mutex<(f64, f64)>,
}

impl SimulatedSensor {
    pub fn new(temperature: f64, humidity: f64) -> Self {
        Self {
            base: Mutex::new((temperature, humidity)),
        }
    }

    /// Shift the baseline to a reading produced by a higher-priority source.
    pub fn observe(&self, reading: &SensorReading) {
        let mut base = self.base.lock().expect("simulation baseline poisoned");
        *base = (reading.temperature, reading.humidity);
    }

    pub fn read(&self) -> SensorReading {
        let (temp, humi) = *self.base.lock().expect("simulation baseline poisoned");
        SensorReading {
            temperature: round1(temp + (fastrand::f64() - 0.5) * 2.0 * TEMP_JITTER),
            humidity: round1(humi + (fastrand::f64() - 0.5) * 2.0 * HUMIDITY_JITTER),
            door_state: 0,
            pwm: 0,
            source: Source::Simulation,
            timestamp: now_unix().to_string(),
            last_update: OffsetDateTime::now_utc(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

pub struct SourceSelector {
    providers: Vec<Provider>,
    simulation: SimulatedSensor,
}

impl SourceSelector {
    /// `remote` should be Some only when the startup probe succeeded.
    pub fn new(
        remote: Option<Arc<RemoteStore>>,
        hardware: HardwareSensor,
        simulation: SimulatedSensor,
    ) -> Self {
        let mut providers = Vec::new();
        if let Some(store) = remote {
            providers.push(Provider::Remote(store));
        }
        providers.push(Provider::Hardware(hardware));
        Self { providers, simulation }
    }

    /// Never fails: the first provider that answers wins, and the simulation
    /// tail always answers.
    pub async fn get_reading(&self) -> SensorReading {
        for provider in &self.providers {
            if let Some(reading) = provider.try_read().await {
                self.simulation.observe(&reading);
                return reading;
            }
            debug!(source = provider.name(), "source unavailable, falling through");
        }
        self.simulation.read()
    }

    /// Remote-only read, bypassing hardware and simulation. Control decisions
    /// use this so they act on the freshest device observation.
    pub async fn read_remote(&self) -> Option<SensorReading> {
        for provider in &self.providers {
            if let Provider::Remote(store) = provider {
                return store.fetch_latest().await;
            }
        }
        None
    }
}

// ===========================================================================
// Tests
// ===========================================================================
