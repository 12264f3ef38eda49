//! Target-temperature commands: translate a setpoint into a peltier duty
//! cycle and relay it to the device through the remote store.

use serde::Serialize;
use tracing::{info, warn};

use crate::db::now_unix;
use crate::remote::Channel;
use crate::state::AppContext;

/// Minimum effective duty cycle once any cooling is needed.
const PWM_FLOOR: f64 = 80.0;
/// Duty-cycle gain per degree above the setpoint.
const PWM_GAIN: f64 = 35.0;

/// Fixed-offset linear ramp, clamped to the 8-bit actuation ceiling.
pub fn compute_pwm(current: f64, target: f64) -> u8 {
    let diff = current - target;
    if diff <= 0.0 {
        0
    } else {
        (PWM_FLOOR + diff * PWM_GAIN).round().min(255.0) as u8
    }
}

/// Outcome of one `set_target` call. `pwm_sent` with non-empty `errors` means
/// partial delivery (the duty cycle landed, the display write did not).
#[derive(Debug, Serialize)]
pub struct SetTargetOutcome {
    pub target_temperature: f64,
    pub current_temp: f64,
    pub pwm_sent: Option<u8>,
    pub errors: Vec<String>,
}

impl SetTargetOutcome {
    pub fn delivered(&self) -> bool {
        self.pwm_sent.is_some()
    }
}

/// Set the target temperature. The current temperature comes from a fresh
/// remote-only read so the decision is not made on stale local state; if that
/// read fails, the last known reading stands in, then the setpoint itself.
pub async fn set_target(ctx: &AppContext, target: f64) -> SetTargetOutcome {
    let previous = ctx.state.read().await.target_temperature;

    let current_temp = match ctx.selector.read_remote().await {
        Some(reading) => reading.temperature,
        None => {
            let st = ctx.state.read().await;
            st.latest.as_ref().map(|r| r.temperature).unwrap_or(target)
        }
    };

    let mut errors = Vec::new();
    let mut pwm_sent = None;

    match &ctx.remote {
        None => errors.push("remote store unavailable".to_string()),
        Some(remote) => {
            let pwm = compute_pwm(current_temp, target);
            match remote.write(Channel::Peltier, f64::from(pwm)).await {
                Ok(()) => {
                    pwm_sent = Some(pwm);
                    info!(pwm, current_temp, target, "peltier command delivered");
                    // Best-effort display write; a failure here never rolls
                    // back the pwm that already landed.
                    if let Err(e) = remote.write(Channel::TargetTemp, target).await {
                        errors.push(format!("target display write failed: {e}"));
                    }
                }
                Err(e) => errors.push(format!("peltier write failed: {e}")),
            }
        }
    }

    {
        let mut st = ctx.state.write().await;
        st.target_temperature = target;
        st.record_control(match pwm_sent {
            Some(pwm) => format!("target set to {target:.1}°C (pwm {pwm})"),
            None => format!("target set to {target:.1}°C (no command delivered)"),
        });
    }

    if let Err(e) = ctx
        .db
        .insert_temperature_setting(now_unix(), target, Some(previous), "user")
        .await
    {
        warn!("temperature setting persistence failed: {e:#}");
    }

    SetTargetOutcome {
        target_temperature: target,
        current_temp,
        pwm_sent,
        errors,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::hardware::HardwareSensor;
    use crate::source::{SimulatedSensor, SourceSelector};
    use crate::state::{FridgeState, SharedState, DEFAULT_TARGET_TEMPERATURE};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    // -- PWM ramp ------------------------------------------------------------

    #[test]
    fn pwm_saturates_at_ceiling() {
        // diff = 6 -> 80 + 6*35 = 290, clamped to 255.
        assert_eq!(compute_pwm(10.0, 4.0), 255);
    }

    #[test]
    fn pwm_zero_at_setpoint() {
        assert_eq!(compute_pwm(4.0, 4.0), 0);
    }

    #[test]
    fn pwm_zero_below_setpoint() {
        assert_eq!(compute_pwm(2.0, 4.0), 0);
    }

    #[test]
    fn pwm_ramps_linearly_between_floor_and_ceiling() {
        // diff = 2 -> 80 + 70 = 150.
        assert_eq!(compute_pwm(22.0, 20.0), 150);
        // diff = 0.5 -> 80 + 17.5 = 97.5 -> 98.
        assert_eq!(compute_pwm(20.5, 20.0), 98);
        // Smallest positive diff still clears the floor.
        assert_eq!(compute_pwm(20.1, 20.0), 84);
    }

    // -- set_target without a remote store -----------------------------------

    async fn test_ctx() -> Arc<AppContext> {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        let state: SharedState =
            Arc::new(RwLock::new(FridgeState::new(DEFAULT_TARGET_TEMPERATURE)));
        let selector =
            SourceSelector::new(None, HardwareSensor::new(4), SimulatedSensor::new(4.5, 65.0));
        AppContext::new(state, db, None, selector)
    }

    #[tokio::test]
    async fn set_target_without_remote_reports_unavailable() {
        let ctx = test_ctx().await;
        let outcome = set_target(&ctx, 6.0).await;

        assert!(!outcome.delivered());
        assert!(outcome.pwm_sent.is_none());
        assert!(outcome.errors.iter().any(|e| e.contains("remote store unavailable")));

        // The target is still accepted and recorded.
        assert_eq!(ctx.state.read().await.target_temperature, 6.0);
    }

    #[tokio::test]
    async fn set_target_persists_the_setting() {
        let ctx = test_ctx().await;
        set_target(&ctx, 5.0).await;
        set_target(&ctx, 3.0).await;

        let stats = ctx.db.statistics().await.unwrap();
        assert_eq!(stats.setting_count, 2);
    }

    #[tokio::test]
    async fn set_target_falls_back_to_last_known_temperature() {
        let ctx = test_ctx().await;
        {
            let mut st = ctx.state.write().await;
            st.record_latest(crate::reading::SensorReading {
                temperature: 12.0,
                humidity: 60.0,
                door_state: 0,
                pwm: 0,
                source: crate::reading::Source::Remote,
                timestamp: "20250102120000".to_string(),
                last_update: time::OffsetDateTime::now_utc(),
            });
        }

        let outcome = set_target(&ctx, 4.0).await;
        assert_eq!(outcome.current_temp, 12.0);
    }

    #[tokio::test]
    async fn set_target_defaults_current_to_target_without_any_reading() {
        let ctx = test_ctx().await;
        let outcome = set_target(&ctx, 7.0).await;
        assert_eq!(outcome.current_temp, 7.0);
    }
}
