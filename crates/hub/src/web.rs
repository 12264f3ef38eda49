//! HTTP surface: JSON API plus the live sensor event stream.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::control;
use crate::poller::FreshnessState;
use crate::reading::{SensorReading, Status};
use crate::remote::Channel;
use crate::state::AppContext;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/sensors", get(sensors))
        .route("/api/sensors/stream", get(sensors_stream))
        .route("/api/temperature", post(set_temperature))
        .route("/api/oled", get(oled))
        .route("/api/stats", get(stats))
        .route("/api/history/sensors", get(sensor_history))
        .route("/api/remote/history", get(remote_history))
        .route("/api/remote/control/light", post(control_light))
        .route("/api/remote/control/peltier", post(control_peltier))
        .route("/api/remote/control/status", get(control_status))
        .with_state(ctx)
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

// ---------------------------------------------------------------------------
// Sensor reads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SensorsResponse {
    #[serde(flatten)]
    reading: SensorReading,
    status: Status,
    target_temperature: f64,
}

async fn sensors(State(ctx): State<Arc<AppContext>>) -> Json<SensorsResponse> {
    let reading = ctx.selector.get_reading().await;
    if let Err(e) = ctx.maybe_persist(&reading).await {
        warn!("sensor persistence failed: {e:#}");
    }
    let target_temperature = ctx.state.read().await.target_temperature;
    Json(SensorsResponse {
        status: reading.status(),
        target_temperature,
        reading,
    })
}

async fn oled(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let latest = { ctx.state.read().await.latest.clone() };
    let reading = match latest {
        Some(r) => r,
        None => ctx.selector.get_reading().await,
    };
    let now = OffsetDateTime::now_utc().time();
    Json(json!({
        "temperature": reading.temperature,
        "humidity": reading.humidity,
        "status": reading.status(),
        "time": format!("{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second()),
    }))
}

// ---------------------------------------------------------------------------
// Push relay
// ---------------------------------------------------------------------------

/// Live event stream for dashboards: the latest reading immediately on open,
/// then every fresh reading as the poller publishes it. Each subscriber owns
/// an independent receiver, so none competes with another for events; a
/// subscriber never sees an older token after a newer one.
async fn sensors_stream(
    State(ctx): State<Arc<AppContext>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let initial = { ctx.state.read().await.latest.clone() };
    let mut fresh = FreshnessState::seeded(initial.as_ref().map(|r| r.timestamp.clone()));

    let head = tokio_stream::iter(initial.map(|r| Ok(reading_event(&r))));
    let live = BroadcastStream::new(ctx.subscribe()).filter_map(move |item| match item {
        Ok(reading) => {
            if fresh.is_new(&reading) {
                Some(Ok(reading_event(&reading)))
            } else {
                None
            }
        }
        // A lagging subscriber skips what it missed and keeps streaming.
        Err(BroadcastStreamRecvError::Lagged(_)) => None,
    });

    Sse::new(head.chain(live)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn reading_event(reading: &SensorReading) -> Event {
    Event::default().data(serde_json::to_string(reading).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SetTemperatureRequest {
    temperature: f64,
}

async fn set_temperature(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SetTemperatureRequest>,
) -> Json<Value> {
    let outcome = control::set_target(&ctx, req.temperature).await;

    let mut message = format!("target temperature set to {:.1}°C", outcome.target_temperature);
    if !outcome.errors.is_empty() {
        message.push_str(&format!(" (warnings: {})", outcome.errors.join("; ")));
    }

    Json(json!({
        "success": outcome.errors.is_empty(),
        "target_temperature": outcome.target_temperature,
        "pwm_sent": outcome.pwm_sent,
        "current_temp": outcome.current_temp,
        "errors": outcome.errors,
        "message": message,
    }))
}

#[derive(Deserialize)]
struct ControlRequest {
    value: i64,
}

async fn control_light(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<ControlRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(remote) = &ctx.remote else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "remote store unavailable"));
    };

    let value = i64::from(req.value != 0);
    match remote.write(Channel::Light, req.value as f64).await {
        Ok(()) => {
            let mut st = ctx.state.write().await;
            st.record_control(format!("light set to {value}"));
            Ok(Json(json!({ "success": true, "light": value })))
        }
        Err(e) => Err(api_error(StatusCode::BAD_GATEWAY, format!("light write failed: {e}"))),
    }
}

async fn control_peltier(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<ControlRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(remote) = &ctx.remote else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "remote store unavailable"));
    };

    let value = req.value.clamp(0, 255);
    match remote.write(Channel::Peltier, req.value as f64).await {
        Ok(()) => {
            let mut st = ctx.state.write().await;
            st.record_control(format!("peltier set to {value}"));
            Ok(Json(json!({ "success": true, "peltier": value })))
        }
        Err(e) => Err(api_error(StatusCode::BAD_GATEWAY, format!("peltier write failed: {e}"))),
    }
}

async fn control_status(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    let Some(remote) = &ctx.remote else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "remote store unavailable"));
    };

    match remote.control_status().await {
        Some(status) => Ok(Json(json!({
            "success": true,
            "light": status.light,
            "peltier": status.peltier,
            "target_temp": status.target_temp,
            "source": "remote",
        }))),
        None => Err(api_error(StatusCode::BAD_GATEWAY, "control status unreachable")),
    }
}

// ---------------------------------------------------------------------------
// Histories & stats
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

async fn sensor_history(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    match ctx.db.reading_history(limit).await {
        Ok(history) => Ok(Json(json!({
            "success": true,
            "count": history.len(),
            "history": history,
        }))),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))),
    }
}

async fn remote_history(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let Some(remote) = &ctx.remote else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "remote store unavailable"));
    };

    let limit = params.limit.unwrap_or(50).clamp(1, 1000) as usize;
    let history = remote.fetch_history(limit).await;
    Ok(Json(json!({
        "success": true,
        "count": history.len(),
        "history": history,
        "source": "remote",
    })))
}

#[derive(Serialize)]
struct SystemStats {
    used_memory_bytes: u64,
    total_memory_bytes: u64,
    host_uptime_secs: u64,
}

async fn stats(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let snapshot = { ctx.state.read().await.snapshot() };

    let database = match ctx.db.statistics().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("database statistics failed: {e:#}");
            None
        }
    };

    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let system = SystemStats {
        used_memory_bytes: sys.used_memory(),
        total_memory_bytes: sys.total_memory(),
        host_uptime_secs: sysinfo::System::uptime(),
    };

    Json(json!({
        "uptime_secs": snapshot.uptime_secs,
        "remote_available": snapshot.remote_available,
        "latest": snapshot.latest,
        "target_temperature": snapshot.target_temperature,
        "events": snapshot.events,
        "database": database,
        "system": system,
    }))
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(ctx: Arc<AppContext>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!("web api listening on http://{addr}");

    axum::serve(listener, router(ctx))
        .await
        .context("web server error")?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
