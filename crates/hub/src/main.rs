mod config;
mod control;
mod db;
mod hardware;
mod poller;
mod reading;
mod remote;
mod source;
mod state;
mod web;

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use db::Db;
use hardware::HardwareSensor;
use remote::RemoteStore;
use source::{SimulatedSensor, SourceSelector};
use state::{AppContext, FridgeState, SharedState, DEFAULT_TARGET_TEMPERATURE};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = if Path::new(&config_path).exists() {
        config::load(&config_path)?
    } else {
        warn!("{config_path} not found — using defaults (local sources only)");
        Config::default()
    };

    let db_url = env::var("DB_URL").unwrap_or_else(|_| cfg.database.url.clone());
    let web_port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(cfg.web.port);

    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&db_url).await?;
    db.migrate().await?;
    info!("database ready at {db_url}");

    // ── Remote store ────────────────────────────────────────────────
    // One connectivity probe at startup decides availability for the life of
    // the process; per-call failures afterwards degrade to cache/fallbacks.
    let remote = match &cfg.remote {
        Some(remote_cfg) => Some(Arc::new(RemoteStore::new(remote_cfg)?)),
        None => None,
    };
    let remote_available = match &remote {
        Some(store) => {
            let ok = store.probe().await;
            if ok {
                info!("remote store reachable");
            } else {
                warn!("remote store unreachable — continuing on local sources");
            }
            ok
        }
        None => false,
    };
    let remote = remote.filter(|_| remote_available);

    // ── Shared state & context ──────────────────────────────────────
    let state: SharedState = Arc::new(RwLock::new(FridgeState::new(DEFAULT_TARGET_TEMPERATURE)));
    {
        let mut st = state.write().await;
        st.remote_available = remote_available;
        st.record_system("hub started".to_string());
    }

    let hardware = HardwareSensor::new(cfg.hardware.dht_pin);
    let simulation = SimulatedSensor::new(
        cfg.simulation.base_temperature,
        cfg.simulation.base_humidity,
    );
    let selector = SourceSelector::new(remote.clone(), hardware, simulation);
    let ctx = AppContext::new(state, db, remote, selector);

    // ── Freshness poller ────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_handle = ctx
        .remote
        .is_some()
        .then(|| tokio::spawn(poller::run(Arc::clone(&ctx), shutdown_rx)));

    // ── Web server ──────────────────────────────────────────────────
    let mut web_handle = tokio::spawn(web::serve(Arc::clone(&ctx), web_port));

    tokio::select! {
        res = &mut web_handle => {
            return match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(anyhow::anyhow!("web server task failed: {e}")),
            };
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    // Cooperative stop: the poller exits at its next iteration.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = poller_handle {
        let _ = handle.await;
    }
    web_handle.abort();

    {
        let mut st = ctx.state.write().await;
        st.record_system("hub stopped".to_string());
    }
    info!("hub stopped");
    Ok(())
}
