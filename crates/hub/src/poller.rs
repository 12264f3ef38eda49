//! Background freshness poller: turns the device's slow push cadence into an
//! update stream for live subscribers.
//!
//! The upstream refreshes `Current` every 2-3 s; sub-second polling here only
//! buys relay responsiveness, so the interval is a responsiveness/cost
//! tradeoff, not a correctness requirement.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::reading::SensorReading;
use crate::state::AppContext;

pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Change detection
// ---------------------------------------------------------------------------

/// Tracks the last seen version token. Shared by the poller (one instance)
/// and each relay subscriber (one instance per stream).
pub(crate) struct FreshnessState {
    last_token: Option<String>,
}

impl FreshnessState {
    pub(crate) fn new() -> Self {
        Self { last_token: None }
    }

    /// Start from an already-emitted token so the first live event is not a
    /// duplicate of the snapshot.
    pub(crate) fn seeded(last_token: Option<String>) -> Self {
        Self { last_token }
    }

    /// True when the reading's version token differs from the last seen one.
    pub(crate) fn is_new(&mut self, reading: &SensorReading) -> bool {
        if self.last_token.as_deref() == Some(reading.timestamp.as_str()) {
            return false;
        }
        self.last_token = Some(reading.timestamp.clone());
        true
    }
}

// ---------------------------------------------------------------------------
// Poller loop
// ---------------------------------------------------------------------------

/// Run until the shutdown signal fires. Spawned once at startup when a remote
/// store is available; termination is cooperative, bounded by one fetch
/// round-trip plus the poll interval.
pub async fn run(ctx: Arc<AppContext>, mut shutdown: watch::Receiver<bool>) {
    let Some(remote) = ctx.remote.clone() else {
        return;
    };

    let mut fresh = FreshnessState::new();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_ms = POLL_INTERVAL.as_millis() as u64, "freshness poller started");
    {
        let mut st = ctx.state.write().await;
        st.record_poller("freshness poller started".to_string());
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("freshness poller stopping");
                break;
            }
            _ = ticker.tick() => {}
        }

        let Some(reading) = remote.fetch_latest().await else {
            continue;
        };
        if !fresh.is_new(&reading) {
            continue;
        }

        {
            let mut st = ctx.state.write().await;
            st.record_latest(reading.clone());
        }
        ctx.publish(reading.clone());

        if let Err(e) = ctx.maybe_persist(&reading).await {
            warn!("reading persistence failed: {e:#}");
            {
                let mut st = ctx.state.write().await;
                st.record_error(format!("reading persistence failed: {e:#}"));
            }
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }

    let mut st = ctx.state.write().await;
    st.record_poller("freshness poller stopped".to_string());
}

// ===========================================================================
// Tests
// ===========================================================================
