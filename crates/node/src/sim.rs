//! Stateful fridge telemetry simulator for local development.
//!
//! Models plausible compartment behaviour:
//! - Temporal coherence via random walk with mean reversion
//! - Heat leak toward ambient, accelerated while the door is open
//! - Cooling proportional to the applied peltier duty cycle
//! - Occasional spikes (sensor flakiness)
//! - Door-open episodes lasting a handful of ticks
//! - Humidity that rises with an open door and relaxes back

use std::fmt;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Holds near the setpoint with light noise and rare door openings.
    Nominal,
    /// Warm ambient and a weak compressor: temperature creeps up unless the
    /// hub commands serious cooling. Exercises the control path.
    Warm,
    /// High noise, frequent spikes, frequent door openings. Tests the hub's
    /// change detection and averaging robustness.
    Flaky,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "warm" => Self::Warm,
            "flaky" => Self::Flaky,
            _ => Self::Nominal, // default
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nominal => write!(f, "nominal"),
            Self::Warm => write!(f, "warm"),
            Self::Flaky => write!(f, "flaky"),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// One telemetry sample, in wire units.
#[derive(Debug, Clone, Copy)]
pub struct FridgeSample {
    pub temperature: f64,
    pub humidity: f64,
    pub door: u8,
    pub pwm: u8,
}

/// Stateful simulator producing realistic compartment telemetry.
pub struct FridgeSim {
    temperature: f64,
    humidity: f64,

    // Environment
    ambient: f64,
    leak_rate: f64,

    // Random walk parameters
    walk_sigma: f64,
    humi_sigma: f64,

    // Spike parameters
    spike_prob: f32,
    spike_sigma: f64,

    // Door model
    door_prob: f32,
    door_open_ticks: u32,

    // Actuation
    pwm: u8,
    cooling_gain: f64,
}

impl FridgeSim {
    /// Create a simulator starting at `temperature` / `humidity`.
    pub fn new(scenario: Scenario, temperature: f64, humidity: f64) -> Self {
        let (ambient, leak_rate, walk_sigma, humi_sigma, spike_prob, spike_sigma, door_prob, cooling_gain) =
            match scenario {
                Scenario::Nominal => (12.0, 0.010, 0.05, 0.3, 0.01_f32, 1.0, 0.02_f32, 0.30),
                Scenario::Warm => (28.0, 0.030, 0.08, 0.4, 0.02, 1.5, 0.03, 0.18),
                Scenario::Flaky => (12.0, 0.012, 0.20, 0.8, 0.10, 3.0, 0.08, 0.30),
            };

        Self {
            temperature,
            humidity,
            ambient,
            leak_rate,
            walk_sigma,
            humi_sigma,
            spike_prob,
            spike_sigma,
            door_prob,
            door_open_ticks: 0,
            pwm: 0,
            cooling_gain,
        }
    }

    /// Apply a peltier command read back from the control channel. The model
    /// cools proportionally to the duty cycle on subsequent ticks.
    pub fn apply_pwm(&mut self, pwm: u8) {
        self.pwm = pwm;
    }

    pub fn pwm(&self) -> u8 {
        self.pwm
    }

    /// Advance one tick and produce the next sample. Call once per push
    /// interval; the internal state evolves with each call.
    pub fn tick(&mut self) -> FridgeSample {
        // -- Door episodes -------------------------------------------------
        if self.door_open_ticks > 0 {
            self.door_open_ticks -= 1;
        } else if fastrand::f32() < self.door_prob {
            self.door_open_ticks = fastrand::u32(3..15);
        }
        let door_open = self.door_open_ticks > 0;

        // -- Evolve temperature --------------------------------------------

        // Heat leak toward ambient; an open door leaks much faster.
        let leak = self.leak_rate
            * (self.ambient - self.temperature)
            * if door_open { 4.0 } else { 1.0 };

        // Active cooling proportional to the commanded duty cycle.
        let cooling = self.cooling_gain * (self.pwm as f64 / 255.0);

        let walk = gaussian(0.0, self.walk_sigma);

        self.temperature = (self.temperature + leak - cooling + walk).clamp(-10.0, 35.0);

        // -- Evolve humidity -----------------------------------------------

        // Warm room air carries moisture in; otherwise relax toward 65%.
        let humi_pull = 0.05 * (65.0 - self.humidity) + if door_open { 1.5 } else { 0.0 };
        self.humidity =
            (self.humidity + humi_pull + gaussian(0.0, self.humi_sigma)).clamp(20.0, 100.0);

        // -- Instantaneous reading -----------------------------------------

        let spike = if fastrand::f32() < self.spike_prob {
            gaussian(0.0, self.spike_sigma)
        } else {
            0.0
        };

        FridgeSample {
            temperature: round1((self.temperature + spike).clamp(-40.0, 60.0)),
            humidity: round1(self.humidity),
            door: u8::from(door_open),
            pwm: self.pwm,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
