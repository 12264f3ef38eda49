//! Client for the cloud realtime store the emulated device reports into.
//!
//! The device keeps two upstream paths: `Current` (overwritten every 2-3 s)
//! and `History` (append-only log, one record per ~30 s). Reads prefer the
//! current-value path and fall back to the newest history record; when both
//! fail, a short-lived cache shields callers from transient network trouble.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::reading::{SensorReading, Source, CURRENT_TOKEN};

/// How long a cached reading may stand in for a failed live fetch.
pub const CACHE_MAX_AGE: Duration = Duration::from_secs(30);

/// Bounded attempts for latest-state reads and control writes.
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(300);

// ---------------------------------------------------------------------------
// Channels & errors
// ---------------------------------------------------------------------------

/// Writable control channels on the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Light,
    Peltier,
    TargetTemp,
}

impl Channel {
    fn path(&self) -> &'static str {
        match self {
            Self::Light => "Control/Light",
            Self::Peltier => "Control/Peltier",
            Self::TargetTemp => "Control/TargetTemp",
        }
    }

    /// Domain clamp applied before transmission.
    pub fn clamp(&self, value: f64) -> serde_json::Value {
        match self {
            Self::Light => json!(if value != 0.0 { 1 } else { 0 }),
            Self::Peltier => json!(value.round().clamp(0.0, 255.0) as i64),
            Self::TargetTemp => json!((value * 10.0).round() / 10.0),
        }
    }
}

/// A control write that did not land. Rejection (the store answered and said
/// no) is kept apart from transport trouble so the operator can tell
/// "network down" from "write refused".
#[derive(Debug)]
pub enum WriteError {
    Transport(String),
    Rejected(StatusCode),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Rejected(status) => write!(f, "write refused ({status})"),
        }
    }
}

impl std::error::Error for WriteError {}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// Current-value payload. `Temp` is mandatory: a record without it is treated
/// as malformed and the caller falls through to the history path.
#[derive(Debug, Deserialize)]
struct CurrentPayload {
    #[serde(rename = "Temp")]
    temp: f64,
    #[serde(rename = "Humi", default)]
    humi: f64,
    #[serde(rename = "Door", default)]
    door: i64,
    #[serde(rename = "PWM", default)]
    pwm: i64,
}

/// History records tolerate missing fields; the device firmware has shipped
/// partial rows before.
#[derive(Debug, Default, Deserialize)]
struct HistoryRecord {
    #[serde(rename = "Temp", default)]
    temp: f64,
    #[serde(rename = "Humi", default)]
    humi: f64,
    #[serde(rename = "Door", default)]
    door: i64,
    #[serde(rename = "PWM", default)]
    pwm: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
    pub door_state: u8,
    pub pwm: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlStatus {
    #[serde(rename(deserialize = "Light"), default)]
    pub light: i64,
    #[serde(rename(deserialize = "Peltier"), default)]
    pub peltier: i64,
    #[serde(rename(deserialize = "TargetTemp"), default)]
    pub target_temp: f64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CacheEntry {
    reading: SensorReading,
    fetched_at: Instant,
}

pub struct RemoteStore {
    base_url: String,
    auth_token: String,
    client: reqwest::Client,
    current_timeout: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl RemoteStore {
    pub fn new(cfg: &RemoteConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_sec))
            .build()?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth_token: cfg.auth_token.clone(),
            client,
            current_timeout: Duration::from_secs(cfg.current_timeout_sec),
            cache: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}.json?auth={}", self.base_url, self.auth_token)
    }

    /// Startup connectivity check. The result seeds the process-wide
    /// availability flag and is never re-validated automatically.
    pub async fn probe(&self) -> bool {
        match self.get_with_retry("Control", Some(self.current_timeout)).await {
            Ok(resp) if resp.status() == StatusCode::OK => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "remote store probe refused");
                false
            }
            Err(e) => {
                warn!("remote store probe failed: {e}");
                false
            }
        }
    }

    /// Newest reading, or None. Never an error: network failure is a normal,
    /// expected condition for a possibly-offline device.
    pub async fn fetch_latest(&self) -> Option<SensorReading> {
        if let Some(reading) = self.fetch_current().await {
            self.store_cache(&reading);
            return Some(reading);
        }

        match self.fetch_latest_from_history().await {
            Some(reading) => {
                self.store_cache(&reading);
                Some(reading)
            }
            None => self.cached_if_fresh(),
        }
    }

    async fn fetch_current(&self) -> Option<SensorReading> {
        let resp = match self.get_with_retry("Current", Some(self.current_timeout)).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("current-value fetch failed: {e}");
                return None;
            }
        };
        if resp.status() != StatusCode::OK {
            debug!(status = %resp.status(), "current-value fetch refused");
            return None;
        }
        match resp.json::<CurrentPayload>().await {
            Ok(payload) => Some(current_reading(payload, OffsetDateTime::now_utc())),
            Err(e) => {
                debug!("malformed current-value payload: {e}");
                None
            }
        }
    }

    async fn fetch_latest_from_history(&self) -> Option<SensorReading> {
        let resp = match self.client.get(self.url("History")).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!("history fetch failed: {e}");
                return None;
            }
        };
        if resp.status() != StatusCode::OK {
            debug!(status = %resp.status(), "history fetch refused");
            return None;
        }
        let data = match resp.json::<BTreeMap<String, HistoryRecord>>().await {
            Ok(data) => data,
            Err(e) => {
                debug!("malformed history payload: {e}");
                return None;
            }
        };
        latest_history_reading(data, OffsetDateTime::now_utc())
    }

    /// Full history, oldest first, at most `limit` entries. Bulk read:
    /// single-shot, no retry.
    pub async fn fetch_history(&self, limit: usize) -> Vec<HistoryEntry> {
        let resp = match self.client.get(self.url("History")).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => resp,
            Ok(resp) => {
                warn!(status = %resp.status(), "history fetch refused");
                return Vec::new();
            }
            Err(e) => {
                warn!("history fetch failed: {e}");
                return Vec::new();
            }
        };

        let data = match resp.json::<BTreeMap<String, HistoryRecord>>().await {
            Ok(data) => data,
            Err(e) => {
                warn!("malformed history payload: {e}");
                return Vec::new();
            }
        };

        let skip = data.len().saturating_sub(limit);
        data.into_iter()
            .skip(skip)
            .map(|(key, rec)| HistoryEntry {
                timestamp: key,
                temperature: rec.temp,
                humidity: rec.humi,
                door_state: clamp_door(rec.door),
                pwm: clamp_pwm(rec.pwm),
            })
            .collect()
    }

    pub async fn control_status(&self) -> Option<ControlStatus> {
        let resp = self
            .get_with_retry("Control", Some(self.current_timeout))
            .await
            .ok()?;
        if resp.status() != StatusCode::OK {
            return None;
        }
        // The control path is null until the first write lands.
        resp.json::<Option<ControlStatus>>()
            .await
            .ok()
            .map(Option::unwrap_or_default)
    }

    /// Clamped control write. Idempotent PUT, up to [`MAX_ATTEMPTS`] tries,
    /// retried only on 429/5xx.
    pub async fn write(&self, channel: Channel, value: f64) -> Result<(), WriteError> {
        let body = channel.clamp(value);
        let url = self.url(channel.path());

        let mut attempt = 1;
        loop {
            let resp = self
                .client
                .put(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| WriteError::Transport(e.to_string()))?;

            let status = resp.status();
            if status == StatusCode::OK {
                debug!(channel = channel.path(), %body, "control write accepted");
                return Ok(());
            }
            if retryable_status(status) && attempt < MAX_ATTEMPTS {
                debug!(channel = channel.path(), %status, attempt, "control write retrying");
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
                continue;
            }
            return Err(WriteError::Rejected(status));
        }
    }

    // -- Retry & cache plumbing ---------------------------------------------

    /// GET with bounded retry, for latest-state reads and the probe. Retries
    /// cover transport failures and 429/5xx answers.
    async fn get_with_retry(
        &self,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut attempt = 1;
        loop {
            let mut req = self.client.get(self.url(path));
            if let Some(t) = timeout {
                req = req.timeout(t);
            }
            match req.send().await {
                Ok(resp) if retryable_status(resp.status()) && attempt < MAX_ATTEMPTS => {
                    debug!(path, status = %resp.status(), attempt, "retrying");
                }
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    debug!(path, attempt, "retrying after transport error: {e}");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(backoff_delay(attempt)).await;
            attempt += 1;
        }
    }

    fn store_cache(&self, reading: &SensorReading) {
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        *cache = Some(CacheEntry {
            reading: reading.clone(),
            fetched_at: Instant::now(),
        });
    }

    /// The cached reading, unmodified, while its age is within
    /// [`CACHE_MAX_AGE`]; None beyond that.
    fn cached_if_fresh(&self) -> Option<SensorReading> {
        let cache = self.cache.lock().expect("cache lock poisoned");
        cache
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() <= CACHE_MAX_AGE)
            .map(|entry| entry.reading.clone())
    }

    #[cfg(test)]
    fn inject_cache(&self, reading: SensorReading, fetched_at: Instant) {
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        *cache = Some(CacheEntry { reading, fetched_at });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE * 2_u32.saturating_pow(attempt.saturating_sub(1))
}

fn clamp_door(value: i64) -> u8 {
    u8::from(value != 0)
}

fn clamp_pwm(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

fn current_reading(payload: CurrentPayload, now: OffsetDateTime) -> SensorReading {
    SensorReading {
        temperature: payload.temp,
        humidity: payload.humi,
        door_state: clamp_door(payload.door),
        pwm: clamp_pwm(payload.pwm),
        source: Source::Remote,
        timestamp: CURRENT_TOKEN.to_string(),
        last_update: now,
    }
}

/// Newest history record by key. Keys sort as plain strings, which holds as
/// long as the device emits fixed-width timestamp keys.
fn latest_history_reading(
    data: BTreeMap<String, HistoryRecord>,
    now: OffsetDateTime,
) -> Option<SensorReading> {
    let (key, rec) = data.into_iter().next_back()?;
    Some(SensorReading {
        temperature: rec.temp,
        humidity: rec.humi,
        door_state: clamp_door(rec.door),
        pwm: clamp_pwm(rec.pwm),
        source: Source::Remote,
        timestamp: key,
        last_update: now,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // -- Test HTTP stub ------------------------------------------------------

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// Serve canned responses on an ephemeral port. The handler gets the
    /// request method and path (query string included).
    async fn spawn_stub(
        handler: impl Fn(&str, &str) -> String + Send + Sync + 'static,
    ) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = vec![0u8; 4096];
                let n = sock.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                let mut parts = head.split_whitespace();
                let method = parts.next().unwrap_or("").to_string();
                let path = parts.next().unwrap_or("").to_string();
                let resp = handler(&method, &path);
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    fn test_store(base_url: String) -> RemoteStore {
        RemoteStore::new(&RemoteConfig {
            base_url,
            auth_token: "test-token".into(),
            request_timeout_sec: 2,
            current_timeout_sec: 1,
        })
        .unwrap()
    }

    fn test_reading(token: &str, temperature: f64) -> SensorReading {
        SensorReading {
            temperature,
            humidity: 60.0,
            door_state: 0,
            pwm: 0,
            source: Source::Remote,
            timestamp: token.to_string(),
            last_update: OffsetDateTime::now_utc(),
        }
    }

    // -- Channel clamps ------------------------------------------------------

    #[test]
    fn peltier_clamps_to_byte_range() {
        assert_eq!(Channel::Peltier.clamp(-10.0), json!(0));
        assert_eq!(Channel::Peltier.clamp(999.0), json!(255));
        assert_eq!(Channel::Peltier.clamp(80.4), json!(80));
        assert_eq!(Channel::Peltier.clamp(0.0), json!(0));
        assert_eq!(Channel::Peltier.clamp(255.0), json!(255));
    }

    #[test]
    fn light_clamps_to_binary() {
        assert_eq!(Channel::Light.clamp(0.0), json!(0));
        assert_eq!(Channel::Light.clamp(1.0), json!(1));
        assert_eq!(Channel::Light.clamp(42.0), json!(1));
    }

    #[test]
    fn target_temp_rounds_to_tenth() {
        assert_eq!(Channel::TargetTemp.clamp(4.26), json!(4.3));
        assert_eq!(Channel::TargetTemp.clamp(4.0), json!(4.0));
        assert_eq!(Channel::TargetTemp.clamp(-2.55), json!(-2.5));
    }

    // -- Payload decoding ----------------------------------------------------

    #[test]
    fn current_payload_requires_temp() {
        assert!(serde_json::from_str::<CurrentPayload>(r#"{"Humi":50}"#).is_err());

        let p: CurrentPayload =
            serde_json::from_str(r#"{"Temp":4.5,"Humi":65,"Door":1,"PWM":120}"#).unwrap();
        assert_eq!(p.temp, 4.5);
        assert_eq!(p.door, 1);
    }

    #[test]
    fn history_record_tolerates_missing_fields() {
        let r: HistoryRecord = serde_json::from_str(r#"{"Temp":3.0}"#).unwrap();
        assert_eq!(r.temp, 3.0);
        assert_eq!(r.humi, 0.0);
        assert_eq!(r.pwm, 0);
    }

    #[test]
    fn latest_history_picks_greatest_key() {
        let data: BTreeMap<String, HistoryRecord> = serde_json::from_str(
            r#"{
                "20250102120000": {"Temp": 4.0, "Humi": 60},
                "20250102120030": {"Temp": 5.0, "Humi": 61},
                "20250102115930": {"Temp": 3.0, "Humi": 59}
            }"#,
        )
        .unwrap();

        let reading = latest_history_reading(data, OffsetDateTime::now_utc()).unwrap();
        assert_eq!(reading.timestamp, "20250102120030");
        assert_eq!(reading.temperature, 5.0);
        assert_eq!(reading.source, Source::Remote);
    }

    #[test]
    fn latest_history_empty_is_none() {
        assert!(latest_history_reading(BTreeMap::new(), OffsetDateTime::now_utc()).is_none());
    }

    #[test]
    fn wire_clamps_out_of_range_values() {
        assert_eq!(clamp_pwm(999), 255);
        assert_eq!(clamp_pwm(-4), 0);
        assert_eq!(clamp_door(7), 1);
        assert_eq!(clamp_door(0), 0);
    }

    // -- Cache window --------------------------------------------------------

    #[test]
    fn fresh_cache_entry_is_served_unmodified() {
        let store = test_store("http://127.0.0.1:1".into());
        let reading = test_reading("20250102120000", 4.5);
        store.inject_cache(reading.clone(), Instant::now());

        assert_eq!(store.cached_if_fresh(), Some(reading));
    }

    #[test]
    fn stale_cache_entry_is_not_served() {
        let store = test_store("http://127.0.0.1:1".into());
        store.inject_cache(
            test_reading("20250102120000", 4.5),
            Instant::now() - Duration::from_secs(31),
        );

        assert!(store.cached_if_fresh().is_none());
    }

    #[test]
    fn cache_boundary_is_inclusive() {
        let store = test_store("http://127.0.0.1:1".into());
        store.inject_cache(
            test_reading("20250102120000", 4.5),
            Instant::now() - Duration::from_secs(29),
        );

        assert!(store.cached_if_fresh().is_some());
    }

    // -- Retry helpers -------------------------------------------------------

    #[test]
    fn retryable_statuses() {
        assert!(retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!retryable_status(StatusCode::OK));
        assert!(!retryable_status(StatusCode::NOT_FOUND));
        assert!(!retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::from_millis(300));
        assert_eq!(backoff_delay(2), Duration::from_millis(600));
        assert_eq!(backoff_delay(3), Duration::from_millis(1200));
    }

    // -- End-to-end against the stub -----------------------------------------

    #[tokio::test]
    async fn fetch_latest_prefers_current_path() {
        let base = spawn_stub(|_, path| {
            if path.starts_with("/Current.json") {
                http_response("200 OK", r#"{"Temp":5.5,"Humi":62,"Door":0,"PWM":40}"#)
            } else {
                http_response("500 Internal Server Error", "{}")
            }
        })
        .await;

        let store = test_store(base);
        let reading = store.fetch_latest().await.unwrap();
        assert_eq!(reading.timestamp, CURRENT_TOKEN);
        assert_eq!(reading.temperature, 5.5);
        assert_eq!(reading.pwm, 40);
    }

    #[tokio::test]
    async fn fetch_latest_falls_back_to_history() {
        let base = spawn_stub(|_, path| {
            if path.starts_with("/Current.json") {
                // Malformed: no Temp field.
                http_response("200 OK", r#"{"Humi":62}"#)
            } else if path.starts_with("/History.json") {
                http_response(
                    "200 OK",
                    r#"{"20250102120000":{"Temp":4.0},"20250102120030":{"Temp":4.2}}"#,
                )
            } else {
                http_response("404 Not Found", "null")
            }
        })
        .await;

        let store = test_store(base);
        let reading = store.fetch_latest().await.unwrap();
        assert_eq!(reading.timestamp, "20250102120030");
        assert_eq!(reading.temperature, 4.2);
    }

    #[tokio::test]
    async fn fetch_latest_serves_fresh_cache_when_all_paths_fail() {
        let base = spawn_stub(|_, _| http_response("500 Internal Server Error", "{}")).await;

        let store = test_store(base);
        let cached = test_reading("20250102120000", 4.5);
        store.inject_cache(cached.clone(), Instant::now());

        assert_eq!(store.fetch_latest().await, Some(cached));
    }

    #[tokio::test]
    async fn fetch_latest_returns_none_when_cache_is_stale() {
        let base = spawn_stub(|_, _| http_response("500 Internal Server Error", "{}")).await;

        let store = test_store(base);
        store.inject_cache(
            test_reading("20250102120000", 4.5),
            Instant::now() - Duration::from_secs(31),
        );

        assert!(store.fetch_latest().await.is_none());
    }

    #[tokio::test]
    async fn fetch_latest_retries_transient_errors() {
        let hits = StdArc::new(AtomicUsize::new(0));
        let hits_in_stub = StdArc::clone(&hits);
        let base = spawn_stub(move |_, path| {
            if path.starts_with("/Current.json") {
                let n = hits_in_stub.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    http_response("503 Service Unavailable", "{}")
                } else {
                    http_response("200 OK", r#"{"Temp":4.1,"Humi":60}"#)
                }
            } else {
                http_response("404 Not Found", "null")
            }
        })
        .await;

        let store = test_store(base);
        let reading = store.fetch_latest().await.unwrap();
        assert_eq!(reading.temperature, 4.1);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn write_rejection_is_distinct_from_transport_failure() {
        let base = spawn_stub(|method, _| {
            assert_eq!(method, "PUT");
            http_response("400 Bad Request", "{}")
        })
        .await;

        let store = test_store(base);
        match store.write(Channel::Peltier, 120.0).await {
            Err(WriteError::Rejected(status)) => assert_eq!(status, StatusCode::BAD_REQUEST),
            other => panic!("expected rejection, got {other:?}"),
        }

        // Nothing listening at all -> transport error.
        let dead = test_store("http://127.0.0.1:1".into());
        match dead.write(Channel::Peltier, 120.0).await {
            Err(WriteError::Transport(_)) => {}
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_succeeds_on_ok() {
        let base = spawn_stub(|_, _| http_response("200 OK", "120")).await;
        let store = test_store(base);
        store.write(Channel::Peltier, 120.0).await.unwrap();
    }

    #[tokio::test]
    async fn fetch_history_is_ordered_and_limited() {
        let base = spawn_stub(|_, path| {
            if path.starts_with("/History.json") {
                http_response(
                    "200 OK",
                    r#"{
                        "20250102120000":{"Temp":4.0},
                        "20250102120030":{"Temp":4.2},
                        "20250102115930":{"Temp":3.8}
                    }"#,
                )
            } else {
                http_response("404 Not Found", "null")
            }
        })
        .await;

        let store = test_store(base);

        let all = store.fetch_history(50).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].timestamp, "20250102115930");
        assert_eq!(all[2].timestamp, "20250102120030");

        // The newest entries survive the limit, oldest are dropped.
        let limited = store.fetch_history(2).await;
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].timestamp, "20250102120000");
        assert_eq!(limited[1].timestamp, "20250102120030");
    }

    #[tokio::test]
    async fn probe_reflects_reachability() {
        let base = spawn_stub(|_, _| http_response("200 OK", "{}")).await;
        assert!(test_store(base).probe().await);

        let refused = spawn_stub(|_, _| http_response("401 Unauthorized", "{}")).await;
        assert!(!test_store(refused).probe().await);
    }

    #[tokio::test]
    async fn control_status_parses_wire_names() {
        let base = spawn_stub(|_, path| {
            if path.starts_with("/Control.json") {
                http_response("200 OK", r#"{"Light":1,"Peltier":180,"TargetTemp":4.0}"#)
            } else {
                http_response("404 Not Found", "null")
            }
        })
        .await;

        let status = test_store(base).control_status().await.unwrap();
        assert_eq!(status.light, 1);
        assert_eq!(status.peltier, 180);
        assert_eq!(status.target_temp, 4.0);
    }

    #[tokio::test]
    async fn control_status_defaults_when_path_is_null() {
        let base = spawn_stub(|_, _| http_response("200 OK", "null")).await;

        let status = test_store(base).control_status().await.unwrap();
        assert_eq!(status.light, 0);
        assert_eq!(status.peltier, 0);
        assert_eq!(status.target_temp, 0.0);
    }
}
