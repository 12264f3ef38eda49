//! Fridge device emulator: plays the role of the ESP32 firmware, pushing
//! telemetry into the remote realtime store and applying control commands it
//! reads back from the store's control path.

mod sim;

use std::env;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sim::{FridgeSample, FridgeSim, Scenario};

#[derive(Debug, Default, Deserialize)]
struct ControlValues {
    #[serde(rename = "Peltier", default)]
    peltier: i64,
    #[serde(rename = "Light", default)]
    light: i64,
}

/// Fixed-width history key, sortable as a plain string.
fn history_key(now: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Wire payload with the store's fixed, case-sensitive field names.
fn wire_payload(sample: &FridgeSample) -> serde_json::Value {
    json!({
        "Temp": sample.temperature,
        "Humi": sample.humidity,
        "Door": sample.door,
        "PWM": sample.pwm,
    })
}

fn store_url(base: &str, auth: &str, path: &str) -> String {
    format!("{}/{path}.json?auth={auth}", base.trim_end_matches('/'))
}

async fn put_json(client: &reqwest::Client, url: &str, body: &serde_json::Value) -> Result<()> {
    let resp = client.put(url).json(body).send().await?;
    if !resp.status().is_success() {
        bail!("store refused write: {}", resp.status());
    }
    Ok(())
}

async fn fetch_control(client: &reqwest::Client, url: &str) -> Result<ControlValues> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        bail!("store refused control read: {}", resp.status());
    }
    // The control path may be null until the hub writes it for the first time.
    Ok(resp.json::<Option<ControlValues>>().await?.unwrap_or_default())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Env config
    let base_url = env::var("REMOTE_URL").unwrap_or_else(|_| "http://127.0.0.1:9000".to_string());
    let auth = env::var("REMOTE_AUTH").unwrap_or_else(|_| "dev-token".to_string());
    let push_every_s: u64 = env::var("PUSH_EVERY_S")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2);
    let history_every_s: u64 = env::var("HISTORY_EVERY_S")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);
    let scenario = Scenario::from_str_lossy(&env::var("SIM_SCENARIO").unwrap_or_default());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(7))
        .build()?;

    let current_url = store_url(&base_url, &auth, "Current");
    let control_url = store_url(&base_url, &auth, "Control");

    let mut fridge = FridgeSim::new(scenario, 4.5, 65.0);
    let history_every = Duration::from_secs(history_every_s);
    let mut last_history: Option<Instant> = None;

    info!(%scenario, push_every_s, history_every_s, "fridge node emulator started");

    loop {
        // Apply any pending control command before sampling, like the
        // firmware does on its loop.
        match fetch_control(&client, &control_url).await {
            Ok(ctrl) => {
                let pwm = ctrl.peltier.clamp(0, 255) as u8;
                if pwm != fridge.pwm() {
                    info!(pwm, light = ctrl.light, "control command applied");
                }
                fridge.apply_pwm(pwm);
            }
            Err(e) => warn!("control read failed: {e}"),
        }

        let sample = fridge.tick();
        let body = wire_payload(&sample);

        if let Err(e) = put_json(&client, &current_url, &body).await {
            warn!("current push failed: {e}");
        }

        let history_due = last_history
            .map(|t| t.elapsed() >= history_every)
            .unwrap_or(true);
        if history_due {
            let key = history_key(OffsetDateTime::now_utc());
            let url = store_url(&base_url, &auth, &format!("History/{key}"));
            match put_json(&client, &url, &body).await {
                Ok(()) => {
                    info!(%key, temp = sample.temperature, "history record pushed");
                    last_history = Some(Instant::now());
                }
                Err(e) => warn!("history push failed: {e}"),
            }
        }

        sleep(Duration::from_secs(push_every_s)).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    // -- History keys --------------------------------------------------------

    #[test]
    fn history_key_is_fixed_width() {
        let key = history_key(datetime!(2025-01-02 03:04:05 UTC));
        assert_eq!(key, "20250102030405");
        assert_eq!(key.len(), 14);
    }

    #[test]
    fn history_keys_sort_chronologically_as_strings() {
        let earlier = history_key(datetime!(2025-01-02 09:59:59 UTC));
        let later = history_key(datetime!(2025-01-02 10:00:00 UTC));
        assert!(earlier < later);

        let year_boundary_a = history_key(datetime!(2024-12-31 23:59:59 UTC));
        let year_boundary_b = history_key(datetime!(2025-01-01 00:00:00 UTC));
        assert!(year_boundary_a < year_boundary_b);
    }

    // -- Wire payload --------------------------------------------------------

    #[test]
    fn wire_payload_uses_store_field_names() {
        let sample = FridgeSample {
            temperature: 4.5,
            humidity: 65.0,
            door: 1,
            pwm: 120,
        };
        let json = wire_payload(&sample);

        assert_eq!(json["Temp"], 4.5);
        assert_eq!(json["Humi"], 65.0);
        assert_eq!(json["Door"], 1);
        assert_eq!(json["PWM"], 120);
        // Exactly these four fields, no extras.
        assert_eq!(json.as_object().unwrap().len(), 4);
    }

    // -- URLs ----------------------------------------------------------------

    #[test]
    fn store_url_formats_path_and_auth() {
        assert_eq!(
            store_url("http://127.0.0.1:9000", "tok", "Current"),
            "http://127.0.0.1:9000/Current.json?auth=tok"
        );
        // Trailing slash on the base is tolerated.
        assert_eq!(
            store_url("http://127.0.0.1:9000/", "tok", "History/20250102030405"),
            "http://127.0.0.1:9000/History/20250102030405.json?auth=tok"
        );
    }

    // -- Control decoding ----------------------------------------------------

    #[test]
    fn control_values_tolerate_missing_fields() {
        let ctrl: ControlValues = serde_json::from_str(r#"{"Peltier":180}"#).unwrap();
        assert_eq!(ctrl.peltier, 180);
        assert_eq!(ctrl.light, 0);

        let empty: Option<ControlValues> = serde_json::from_str("null").unwrap();
        assert!(empty.is_none());
    }
}
