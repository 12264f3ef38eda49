//! TOML config file loading and validation for the hub.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Remote realtime-store binding. Absent means the hub runs on local
    /// sources only (hardware, then simulation).
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_token: String,
    /// Timeout for history reads, control reads, and writes.
    #[serde(default = "default_request_timeout_sec")]
    pub request_timeout_sec: u64,
    /// Tighter timeout for the current-value path; the device refreshes it
    /// every 2-3 s, so a slow answer is as good as no answer.
    #[serde(default = "default_current_timeout_sec")]
    pub current_timeout_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_base_temperature")]
    pub base_temperature: f64,
    #[serde(default = "default_base_humidity")]
    pub base_humidity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HardwareConfig {
    /// BCM pin the DHT22 data line is wired to.
    #[serde(default = "default_dht_pin")]
    pub dht_pin: u8,
}

fn default_request_timeout_sec() -> u64 {
    7
}

fn default_current_timeout_sec() -> u64 {
    5
}

fn default_web_port() -> u16 {
    8080
}

fn default_db_url() -> String {
    "sqlite:fridge.db?mode=rwc".to_string()
}

fn default_base_temperature() -> f64 {
    4.5
}

fn default_base_humidity() -> f64 {
    65.0
}

fn default_dht_pin() -> u8 {
    4
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { port: default_web_port() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: default_db_url() }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_temperature: default_base_temperature(),
            base_humidity: default_base_humidity(),
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self { dht_pin: default_dht_pin() }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: &[u8] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if let Some(remote) = &self.remote {
            remote.validate(&mut errors);
        }
        self.validate_web(&mut errors);
        self.validate_database(&mut errors);
        self.validate_simulation(&mut errors);
        self.validate_hardware(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_web(&self, errors: &mut Vec<String>) {
        if self.web.port == 0 {
            errors.push("web: port must be nonzero".to_string());
        }
    }

    fn validate_database(&self, errors: &mut Vec<String>) {
        if self.database.url.trim().is_empty() {
            errors.push("database: url is empty".to_string());
        } else if !self.database.url.starts_with("sqlite:") {
            errors.push(format!(
                "database: url '{}' must be a sqlite connection string",
                self.database.url
            ));
        }
    }

    fn validate_simulation(&self, errors: &mut Vec<String>) {
        if !(-40.0..=60.0).contains(&self.simulation.base_temperature) {
            errors.push(format!(
                "simulation: base_temperature {} out of range [-40, 60]",
                self.simulation.base_temperature
            ));
        }
        if !(0.0..=100.0).contains(&self.simulation.base_humidity) {
            errors.push(format!(
                "simulation: base_humidity {} out of range [0, 100]",
                self.simulation.base_humidity
            ));
        }
    }

    fn validate_hardware(&self, errors: &mut Vec<String>) {
        if !VALID_GPIO_PINS.contains(&self.hardware.dht_pin) {
            errors.push(format!(
                "hardware: dht_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.hardware.dht_pin
            ));
        }
    }
}

impl RemoteConfig {
    fn validate(&self, errors: &mut Vec<String>) {
        if self.base_url.trim().is_empty() {
            errors.push("remote: base_url is empty".to_string());
        } else if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(format!(
                "remote: base_url '{}' must start with http:// or https://",
                self.base_url
            ));
        }

        if self.auth_token.trim().is_empty() {
            errors.push("remote: auth_token is empty".to_string());
        }

        if self.request_timeout_sec == 0 {
            errors.push("remote: request_timeout_sec must be positive".to_string());
        }
        if self.current_timeout_sec == 0 {
            errors.push("remote: current_timeout_sec must be positive".to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- Helper: build a valid baseline config that passes validation ------

    fn valid_remote() -> RemoteConfig {
        RemoteConfig {
            base_url: "https://demo-rtdb.example.firebasedatabase.app".into(),
            auth_token: "secret".into(),
            request_timeout_sec: 7,
            current_timeout_sec: 5,
        }
    }

    fn valid_config() -> Config {
        Config {
            remote: Some(valid_remote()),
            ..Config::default()
        }
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[remote]
base_url = "https://demo-rtdb.example.firebasedatabase.app"
auth_token = "secret"

[web]
port = 9090

[database]
url = "sqlite::memory:"

[simulation]
base_temperature = 5.0
base_humidity = 70.0

[hardware]
dht_pin = 17
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let remote = config.remote.as_ref().unwrap();
        assert_eq!(remote.base_url, "https://demo-rtdb.example.firebasedatabase.app");
        assert_eq!(remote.request_timeout_sec, 7); // default applies
        assert_eq!(config.web.port, 9090);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.hardware.dht_pin, 17);
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.remote.is_none());
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.database.url, "sqlite:fridge.db?mode=rwc");
        assert_eq!(config.simulation.base_temperature, 4.5);
        assert_eq!(config.hardware.dht_pin, 4);
    }

    // -- Validation: valid configs pass -----------------------------------

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn config_without_remote_passes() {
        Config::default().validate().unwrap();
    }

    // -- Remote ------------------------------------------------------------

    #[test]
    fn remote_empty_base_url_rejected() {
        let mut cfg = valid_config();
        cfg.remote.as_mut().unwrap().base_url = "  ".into();
        assert_validation_err(&cfg, "base_url is empty");
    }

    #[test]
    fn remote_non_http_base_url_rejected() {
        let mut cfg = valid_config();
        cfg.remote.as_mut().unwrap().base_url = "ftp://example.com".into();
        assert_validation_err(&cfg, "must start with http:// or https://");
    }

    #[test]
    fn remote_empty_auth_token_rejected() {
        let mut cfg = valid_config();
        cfg.remote.as_mut().unwrap().auth_token = "".into();
        assert_validation_err(&cfg, "auth_token is empty");
    }

    #[test]
    fn remote_zero_timeout_rejected() {
        let mut cfg = valid_config();
        cfg.remote.as_mut().unwrap().request_timeout_sec = 0;
        assert_validation_err(&cfg, "request_timeout_sec must be positive");
    }

    #[test]
    fn remote_zero_current_timeout_rejected() {
        let mut cfg = valid_config();
        cfg.remote.as_mut().unwrap().current_timeout_sec = 0;
        assert_validation_err(&cfg, "current_timeout_sec must be positive");
    }

    // -- Web / database ----------------------------------------------------

    #[test]
    fn web_port_zero_rejected() {
        let mut cfg = valid_config();
        cfg.web.port = 0;
        assert_validation_err(&cfg, "port must be nonzero");
    }

    #[test]
    fn database_empty_url_rejected() {
        let mut cfg = valid_config();
        cfg.database.url = "".into();
        assert_validation_err(&cfg, "url is empty");
    }

    #[test]
    fn database_non_sqlite_url_rejected() {
        let mut cfg = valid_config();
        cfg.database.url = "postgres://localhost/fridge".into();
        assert_validation_err(&cfg, "must be a sqlite connection string");
    }

    // -- Simulation --------------------------------------------------------

    #[test]
    fn simulation_temperature_out_of_range() {
        let mut cfg = valid_config();
        cfg.simulation.base_temperature = 99.0;
        assert_validation_err(&cfg, "base_temperature 99 out of range");
    }

    #[test]
    fn simulation_humidity_out_of_range() {
        let mut cfg = valid_config();
        cfg.simulation.base_humidity = -1.0;
        assert_validation_err(&cfg, "base_humidity -1 out of range");
    }

    // -- Hardware ----------------------------------------------------------

    #[test]
    fn hardware_pin_0_rejected() {
        let mut cfg = valid_config();
        cfg.hardware.dht_pin = 0;
        assert_validation_err(&cfg, "not a valid BCM GPIO pin");
    }

    #[test]
    fn hardware_pin_28_rejected() {
        let mut cfg = valid_config();
        cfg.hardware.dht_pin = 28;
        assert_validation_err(&cfg, "not a valid BCM GPIO pin");
    }

    #[test]
    fn hardware_boundary_pins_accepted() {
        let mut cfg = valid_config();
        cfg.hardware.dht_pin = 2;
        cfg.validate().unwrap();
        cfg.hardware.dht_pin = 27;
        cfg.validate().unwrap();
    }

    // -- Multiple errors reported at once ---------------------------------

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = valid_config();
        cfg.remote.as_mut().unwrap().base_url = "".into();
        cfg.remote.as_mut().unwrap().auth_token = "".into();
        cfg.web.port = 0;
        cfg.hardware.dht_pin = 1;

        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        // Should report every violation, not bail after the first
        assert!(msg.contains("base_url is empty"), "missing base_url error in: {msg}");
        assert!(msg.contains("auth_token is empty"), "missing token error in: {msg}");
        assert!(msg.contains("port must be nonzero"), "missing port error in: {msg}");
        assert!(
            msg.contains("not a valid BCM GPIO pin"),
            "missing gpio error in: {msg}"
        );
    }
}
