use crate::errors::{Error, Result};
use crate::metrics::{STORE_FAILURES_TOTAL, STORE_LATENCY_SECONDS};
use crate::model::{Metrics, Reading};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info};

const UPSERT_SQL: &str = r#"
    INSERT INTO latest_readings (device_id, timestamp, metrics_json, received_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(device_id) DO UPDATE SET
        timestamp = excluded.timestamp,
        metrics_json = excluded.metrics_json,
        received_at = excluded.received_at
    "#;

const SELECT_ONE_SQL: &str = r#"
    SELECT device_id, timestamp, metrics_json, received_at
    FROM latest_readings
    WHERE device_id = ?1
    "#;

const SELECT_ALL_SQL: &str = r#"
    SELECT device_id, timestamp, metrics_json, received_at
    FROM latest_readings
    ORDER BY device_id ASC
    "#;

#[derive(Debug, sqlx::FromRow)]
struct ReadingRow {
    device_id: String,
    timestamp: String,
    metrics_json: String,
    received_at: String,
}

impl TryFrom<ReadingRow> for Reading {
    type Error = Error;

    fn try_from(row: ReadingRow) -> Result<Self> {
        let metrics = decode_metrics(&row.device_id, &row.metrics_json)?;
        Ok(Reading {
            device_id: row.device_id,
            timestamp: row.timestamp,
            received_at: row.received_at,
            metrics,
        })
    }
}

/// Latest reading per device, backed by a SQLite file.
///
/// Cloning is cheap and shares the underlying pool. Every call checks a
/// connection out for the length of one statement.
#[derive(Debug, Clone)]
pub struct ReadingStore {
    pool: SqlitePool,
}

impl ReadingStore {
    /// Opens (or creates) the database at `path` and applies migrations.
    /// Safe to call on an existing database; its rows are kept.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Opening database at {}", path.display());
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Migrations completed");

        Ok(Self { pool })
    }

    /// Inserts the reading, or replaces every column of the existing row for
    /// the same device in one statement.
    pub async fn upsert(
        &self,
        device_id: &str,
        timestamp: &str,
        metrics: &Metrics,
        received_at: &str,
    ) -> Result<()> {
        let metrics_json = encode_metrics(metrics)?;

        let start = Instant::now();
        let result = sqlx::query(UPSERT_SQL)
            .bind(device_id)
            .bind(timestamp)
            .bind(&metrics_json)
            .bind(received_at)
            .execute(&self.pool)
            .await;
        observe("upsert", start, result)?;

        Ok(())
    }

    pub async fn fetch_one(&self, device_id: &str) -> Result<Option<Reading>> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, ReadingRow>(SELECT_ONE_SQL)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await;

        observe("fetch_one", start, result)?
            .map(Reading::try_from)
            .transpose()
    }

    /// All readings ordered by `device_id` ascending.
    pub async fn fetch_all(&self) -> Result<Vec<Reading>> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, ReadingRow>(SELECT_ALL_SQL)
            .fetch_all(&self.pool)
            .await;

        observe("fetch_all", start, result)?
            .into_iter()
            .map(Reading::try_from)
            .collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let start = Instant::now();
        let result = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM latest_readings")
            .fetch_one(&self.pool)
            .await;
        observe("count", start, result)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn observe<T>(op: &str, start: Instant, result: sqlx::Result<T>) -> Result<T> {
    STORE_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
    result.map_err(|e| {
        STORE_FAILURES_TOTAL.inc();
        error!("Database {} failed: {}", op, e);
        Error::Database(e)
    })
}

/// Compact JSON with keys in sorted order.
fn encode_metrics(metrics: &Metrics) -> Result<String> {
    Ok(serde_json::to_string(metrics)?)
}

fn decode_metrics(device_id: &str, raw: &str) -> Result<Metrics> {
    let corrupt = |reason: String| Error::CorruptMetrics {
        device_id: device_id.to_string(),
        reason,
    };

    let metrics: Metrics = serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;
    if metrics.is_empty() {
        return Err(corrupt("empty metrics".to_string()));
    }
    if let Some((key, _)) = metrics.iter().find(|(_, v)| !v.is_finite()) {
        return Err(corrupt(format!("non-finite value for {}", key)));
    }
    Ok(metrics)
}
