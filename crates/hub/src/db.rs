use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use crate::reading::SensorReading;

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

/// A persisted sensor reading, as returned by the history queries.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredReading {
    pub ts: i64,
    pub temperature: f64,
    pub humidity: f64,
    pub target_temperature: f64,
    pub status: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub reading_count: i64,
    pub setting_count: i64,
    pub temperature_min_24h: Option<f64>,
    pub temperature_avg_24h: Option<f64>,
    pub temperature_max_24h: Option<f64>,
}

/// Seconds since the unix epoch.
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl Db {
    /// db_url examples:
    /// - "sqlite:fridge.db?mode=rwc"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Readings
    // ----------------------------

    pub async fn insert_reading(
        &self,
        ts: i64,
        reading: &SensorReading,
        target_temperature: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO readings (ts, temperature, humidity, target_temperature, status, source)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ts)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(target_temperature)
        .bind(reading.status().as_str())
        .bind(reading.source.as_str())
        .execute(&self.pool)
        .await
        .context("insert_reading failed")?;
        Ok(())
    }

    /// Most recent readings first, at most `limit` rows.
    pub async fn reading_history(&self, limit: i64) -> Result<Vec<StoredReading>> {
        sqlx::query_as::<_, StoredReading>(
            r#"
            SELECT ts, temperature, humidity, target_temperature, status, source
            FROM readings
            ORDER BY ts DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("reading_history failed")
    }

    // ----------------------------
    // Temperature settings
    // ----------------------------

    pub async fn insert_temperature_setting(
        &self,
        ts: i64,
        target_temperature: f64,
        previous_temperature: Option<f64>,
        changed_by: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO temperature_settings (ts, target_temperature, previous_temperature, changed_by)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(ts)
        .bind(target_temperature)
        .bind(previous_temperature)
        .bind(changed_by)
        .execute(&self.pool)
        .await
        .context("insert_temperature_setting failed")?;
        Ok(())
    }

    // ----------------------------
    // Statistics
    // ----------------------------

    pub async fn statistics(&self) -> Result<DbStats> {
        let (reading_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await
            .context("statistics: reading count failed")?;

        let (setting_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM temperature_settings")
            .fetch_one(&self.pool)
            .await
            .context("statistics: setting count failed")?;

        let cutoff = now_unix() - 86_400;
        let (temperature_min_24h, temperature_avg_24h, temperature_max_24h): (
            Option<f64>,
            Option<f64>,
            Option<f64>,
        ) = sqlx::query_as(
            "SELECT MIN(temperature), AVG(temperature), MAX(temperature) FROM readings WHERE ts >= ?",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await
        .context("statistics: temperature aggregates failed")?;

        Ok(DbStats {
            reading_count,
            setting_count,
            temperature_min_24h,
            temperature_avg_24h,
            temperature_max_24h,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
