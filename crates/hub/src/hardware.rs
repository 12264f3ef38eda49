//! DHT22 sensor access. The `gpio` feature gates the real rppal driver;
//! without it, a mock that is never available, so the selector falls through
//! to simulation.

#[cfg(feature = "gpio")]
use std::time::{Duration, Instant};

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, IoPin, Mode};

#[cfg(feature = "gpio")]
use crate::reading::{SensorReading, Source};
#[cfg(not(feature = "gpio"))]
use crate::reading::SensorReading;

// ---------------------------------------------------------------------------
// Real DHT22 driver (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------

#[cfg(feature = "gpio")]
pub struct HardwareSensor {
    pin: u8,
}

#[cfg(feature = "gpio")]
impl HardwareSensor {
    pub fn new(pin: u8) -> Self {
        Self { pin }
    }

    /// One sensor read. Returns None on any wire-protocol or checksum
    /// failure; the caller treats that as "hardware unavailable".
    pub fn read(&self) -> Option<SensorReading> {
        match read_dht22(self.pin) {
            Ok((temperature, humidity)) => Some(SensorReading {
                temperature,
                humidity,
                door_state: 0,
                pwm: 0,
                source: Source::Hardware,
                timestamp: crate::db::now_unix().to_string(),
                last_update: time::OffsetDateTime::now_utc(),
            }),
            Err(e) => {
                tracing::warn!(pin = self.pin, "dht22 read failed: {e}");
                None
            }
        }
    }
}

/// Bit-bang the DHT22 single-wire protocol: a >1 ms low start pulse, then 40
/// data bits where a long high (~70 µs) is a 1 and a short high (~26 µs) a 0.
#[cfg(feature = "gpio")]
fn read_dht22(pin: u8) -> anyhow::Result<(f64, f64)> {
    let gpio = Gpio::new()?;
    let mut io = gpio.get(pin)?.into_io(Mode::Output);

    // Start signal.
    io.set_low();
    std::thread::sleep(Duration::from_millis(2));
    io.set_mode(Mode::Input);

    // Sensor response: low ~80 µs, high ~80 µs, then data.
    wait_for_level(&io, false, 200)?;
    wait_for_level(&io, true, 200)?;
    wait_for_level(&io, false, 200)?;

    let mut data = [0u8; 5];
    for bit in 0..40 {
        wait_for_level(&io, true, 100)?;
        let high_us = wait_for_level(&io, false, 150)?;
        if high_us > 48 {
            data[bit / 8] |= 1 << (7 - bit % 8);
        }
    }

    let checksum = data[0]
        .wrapping_add(data[1])
        .wrapping_add(data[2])
        .wrapping_add(data[3]);
    if checksum != data[4] {
        anyhow::bail!("checksum mismatch");
    }

    let humidity = u16::from_be_bytes([data[0], data[1]]) as f64 / 10.0;
    let raw_temp = u16::from_be_bytes([data[2] & 0x7f, data[3]]) as f64 / 10.0;
    let temperature = if data[2] & 0x80 != 0 { -raw_temp } else { raw_temp };

    Ok((temperature, humidity))
}

/// Busy-wait until the line reaches `high`, returning the elapsed µs.
#[cfg(feature = "gpio")]
fn wait_for_level(io: &IoPin, high: bool, timeout_us: u64) -> anyhow::Result<u64> {
    let start = Instant::now();
    while io.is_high() != high {
        if start.elapsed() > Duration::from_micros(timeout_us) {
            anyhow::bail!("timed out waiting for line {}", if high { "high" } else { "low" });
        }
    }
    Ok(start.elapsed().as_micros() as u64)
}

// ---------------------------------------------------------------------------
// Mock sensor (development — no hardware, never available)
// ---------------------------------------------------------------------------

#[cfg(not(feature = "gpio"))]
pub struct HardwareSensor;

#[cfg(not(feature = "gpio"))]
impl HardwareSensor {
    pub fn new(pin: u8) -> Self {
        eprintln!("[mock-gpio] dht22 registered on pin {pin} (not wired)");
        Self
    }

    pub fn read(&self) -> Option<SensorReading> {
        None
    }
}

// ===========================================================================
// Tests
// ===========================================================================
