//! Canonical sensor-reading types shared by every data source.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Version token carried by readings served from the current-value path.
///
/// History readings carry their history key instead; a reading is "new"
/// relative to a prior one iff the token differs.
pub const CURRENT_TOKEN: &str = "current";

// ---------------------------------------------------------------------------
// Source & status tags
// ---------------------------------------------------------------------------

/// Which component produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Remote,
    Hardware,
    Simulation,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Hardware => "hardware",
            Self::Simulation => "simulation",
        }
    }
}

/// Coarse dashboard classification derived from temperature. Recomputed on
/// every read, never stored alongside the reading itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Normal,
    Warming,
    Hot,
}

impl Status {
    pub fn classify(temperature: f64) -> Self {
        if temperature > 25.0 {
            Self::Hot
        } else if temperature > 20.0 {
            Self::Warming
        } else {
            Self::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warming => "warming",
            Self::Hot => "hot",
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical reading
// ---------------------------------------------------------------------------

/// One normalized sensor observation. Immutable once constructed; superseded,
/// never mutated, by the next reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub temperature: f64,
    pub humidity: f64,
    /// 0 = closed, 1 = open.
    pub door_state: u8,
    /// Peltier duty cycle last reported by the device.
    pub pwm: u8,
    pub source: Source,
    /// Opaque version token: [`CURRENT_TOKEN`] or a history key string.
    pub timestamp: String,
    /// Wall clock at normalization time, distinct from the source's own token.
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
}

impl SensorReading {
    pub fn status(&self) -> Status {
        Status::classify(self.temperature)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
