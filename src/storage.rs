//! SQLite statistics store for shieldstats.
//!
//! Records are kept per category in hourly buckets:
//!
//! - `category`: `all` or `blocked`
//! - `ts`: Unix timestamp in seconds identifying the bucket
//! - `request_count`: requests observed in the bucket
//! - `saved_kilobytes`: estimated bandwidth saved (blocked records only)
//!
//! Every mutation bumps a revision counter published through a
//! [`tokio::sync::watch`] channel so that chart refreshers can react to new
//! data without polling the database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::watch;
use tracing::debug;

use crate::model::{LifetimeStats, RequestRecord, StatisticsCategory, hour_bucket};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
    changes: Arc<watch::Sender<u64>>,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:shieldstats.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Each connection to an in-memory database sees its own empty
        // database, so those are pinned to a single long-lived connection.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .test_before_acquire(false)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;

        let (changes, _) = watch::channel(0);
        let storage = Self {
            pool,
            changes: Arc::new(changes),
        };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS request_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                ts INTEGER NOT NULL,
                request_count INTEGER NOT NULL,
                saved_kilobytes INTEGER NOT NULL,
                UNIQUE(category, ts)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Subscribe to change notifications.
    ///
    /// The received value is a revision counter that increases after every
    /// successful insert or reset.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    /// Add a record to its category's hourly bucket.
    ///
    /// The record's date is truncated to the start of its hour. If the
    /// category already has that bucket, the counts are added to it
    /// (saturating at `i64::MAX`) and the bucket keeps its original position.
    /// Negative counts are rejected.
    pub async fn insert_record(
        &self,
        category: StatisticsCategory,
        record: &RequestRecord,
    ) -> anyhow::Result<()> {
        if record.request_count < 0 || record.saved_kilobytes < 0 {
            anyhow::bail!(
                "negative counts in record for {}: request_count={}, saved_kilobytes={}",
                record.date,
                record.request_count,
                record.saved_kilobytes
            );
        }
        let bucket = hour_bucket(record.date);

        // Both sides are non-negative, so `MAX - stored` cannot overflow and
        // the sum never leaves SQLite's integer range.
        sqlx::query(
            r#"
            INSERT INTO request_records (category, ts, request_count, saved_kilobytes)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(category, ts) DO UPDATE SET
                request_count = CASE
                    WHEN excluded.request_count > 9223372036854775807 - request_count
                    THEN 9223372036854775807
                    ELSE request_count + excluded.request_count
                END,
                saved_kilobytes = CASE
                    WHEN excluded.saved_kilobytes > 9223372036854775807 - saved_kilobytes
                    THEN 9223372036854775807
                    ELSE saved_kilobytes + excluded.saved_kilobytes
                END
            "#,
        )
        .bind(category.as_str())
        .bind(bucket.timestamp())
        .bind(record.request_count)
        .bind(record.saved_kilobytes)
        .execute(&self.pool)
        .await?;

        debug!(
            category = %category,
            date = %bucket,
            request_count = record.request_count,
            "Request bucket updated"
        );
        self.notify_changed();

        Ok(())
    }

    /// Read every record of one category, in insertion order.
    pub async fn read_category(
        &self,
        category: StatisticsCategory,
    ) -> anyhow::Result<Vec<RequestRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT ts, request_count, saved_kilobytes
            FROM request_records
            WHERE category = ?
            ORDER BY id
            "#,
        )
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> anyhow::Result<RequestRecord> {
                let ts: i64 = row.try_get("ts")?;
                let date = DateTime::<Utc>::from_timestamp(ts, 0)
                    .ok_or_else(|| anyhow::anyhow!("invalid bucket timestamp {ts}"))?;
                Ok(RequestRecord {
                    date,
                    request_count: row.try_get("request_count")?,
                    saved_kilobytes: row.try_get("saved_kilobytes")?,
                })
            })
            .collect()
    }

    /// Read the records of every category.
    ///
    /// The map has an entry for each [`StatisticsCategory`], empty if the
    /// category has no records.
    pub async fn read_statistics(
        &self,
    ) -> anyhow::Result<HashMap<StatisticsCategory, Vec<RequestRecord>>> {
        let mut statistics = HashMap::new();
        for category in StatisticsCategory::ALL {
            statistics.insert(category, self.read_category(category).await?);
        }
        Ok(statistics)
    }

    /// Sum every stored record into lifetime counters.
    pub async fn lifetime_stats(&self) -> anyhow::Result<LifetimeStats> {
        let rows = sqlx::query(
            r#"
            SELECT category,
                   COALESCE(SUM(request_count), 0) as requests,
                   COALESCE(SUM(saved_kilobytes), 0) as saved
            FROM request_records
            GROUP BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = LifetimeStats::default();
        for row in &rows {
            let category: String = row.try_get("category")?;
            let requests: i64 = row.try_get("requests")?;
            let saved: i64 = row.try_get("saved")?;
            match category.parse::<StatisticsCategory>() {
                Ok(StatisticsCategory::All) => stats.requests_total = requests,
                Ok(StatisticsCategory::Blocked) => {
                    stats.blocked_total = requests;
                    stats.saved_kilobytes = saved;
                }
                Err(e) => debug!(error = %e, "Skipping unknown category"),
            }
        }

        Ok(stats)
    }

    /// Delete every stored record.
    pub async fn reset_statistics(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM request_records")
            .execute(&self.pool)
            .await?;

        self.notify_changed();
        Ok(())
    }
}
