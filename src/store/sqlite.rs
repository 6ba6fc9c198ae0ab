//! SQLite implementation of the durable store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Limitations
//!
//! - **Concurrency**: Limited concurrent writes (use PostgreSQL for high concurrency)
//! - **Distributed**: Single-machine only

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use crate::MonitorStatus;

use super::backend::MonitorStore;
use super::error::{StoreError, StoreResult};
use super::schema::{HistoryRow, MonitorRow, NewMonitor, StatusUpdate};

/// SQLite-backed monitor store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for performance (WAL mode) and enable
    ///    foreign keys so history rows cascade with monitor deletion
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true) // required for history cascade
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        info!("database ready");

        Ok(Self { pool })
    }

    /// Helper to convert timestamp to Unix milliseconds for SQLite
    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    /// Helper to convert Unix milliseconds from SQLite to DateTime
    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn row_to_monitor(row: &sqlx::sqlite::SqliteRow) -> MonitorRow {
        let status: Option<bool> = row.get("status");
        MonitorRow {
            id: row.get("id"),
            user_id: row.get("user_id"),
            url: row.get("url"),
            mail: row.get("mail"),
            mail_notification: row.get("mail_notification"),
            interval_minutes: row.get("interval_minutes"),
            status: MonitorStatus::from_column(status),
            is_active: row.get("is_active"),
            updated_at: Self::millis_to_timestamp(row.get("updated_at")),
        }
    }
}

#[async_trait]
impl MonitorStore for SqliteStore {
    #[instrument(skip(self), fields(now = %now))]
    async fn due_monitors(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> StoreResult<Vec<MonitorRow>> {
        let now_millis = Self::timestamp_to_millis(&now);
        let grace_millis = grace.num_milliseconds();

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, url, mail, mail_notification,
                   interval_minutes, status, is_active, updated_at
            FROM monitors
            WHERE is_active = 1
              AND updated_at + (interval_minutes * 60000) <= ? + ?
            ORDER BY updated_at ASC
            "#,
        )
        .bind(now_millis)
        .bind(grace_millis)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        let monitors: Vec<MonitorRow> = rows.iter().map(Self::row_to_monitor).collect();
        debug!("{} monitors due", monitors.len());
        Ok(monitors)
    }

    #[instrument(skip(self))]
    async fn monitor_ids(&self) -> StoreResult<HashSet<i64>> {
        let rows = sqlx::query("SELECT id FROM monitors")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(rows.iter().map(|row| row.get::<i64, _>("id")).collect())
    }

    #[instrument(skip(self, history, updates), fields(history = history.len(), updates = updates.len()))]
    async fn commit_results(
        &self,
        history: Vec<HistoryRow>,
        updates: Vec<StatusUpdate>,
    ) -> StoreResult<()> {
        if history.is_empty() && updates.is_empty() {
            return Ok(());
        }

        // One transaction per run: either both the history rows and the
        // status updates land, or neither does.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        for row in &history {
            sqlx::query(
                r#"
                INSERT INTO history (monitor_id, timestamp, status, latency_ms)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(row.monitor_id)
            .bind(Self::timestamp_to_millis(&row.timestamp))
            .bind(row.status)
            .bind(row.latency_ms)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        }

        if !updates.is_empty() {
            // Single CASE-expression update instead of one statement per
            // monitor.
            let cases = " WHEN ? THEN ?".repeat(updates.len());
            let placeholders = vec!["?"; updates.len()].join(", ");
            let sql = format!(
                "UPDATE monitors \
                 SET status = CASE id{cases} ELSE status END, \
                     updated_at = CASE id{cases} ELSE updated_at END \
                 WHERE id IN ({placeholders})"
            );

            let mut query = sqlx::query(&sql);
            for update in &updates {
                query = query
                    .bind(update.monitor_id)
                    .bind(update.status.as_column());
            }
            for update in &updates {
                query = query
                    .bind(update.monitor_id)
                    .bind(Self::timestamp_to_millis(&update.updated_at));
            }
            for update in &updates {
                query = query.bind(update.monitor_id);
            }

            query
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        debug!("run committed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_history(&self, monitor_id: i64, limit: usize) -> StoreResult<Vec<HistoryRow>> {
        let rows = sqlx::query(
            r#"
            SELECT monitor_id, timestamp, status, latency_ms
            FROM history
            WHERE monitor_id = ?
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(monitor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| HistoryRow {
                monitor_id: row.get("monitor_id"),
                timestamp: Self::millis_to_timestamp(row.get("timestamp")),
                status: row.get("status"),
                latency_ms: row.get("latency_ms"),
            })
            .collect())
    }

    #[instrument(skip(self, monitor), fields(url = %monitor.url))]
    async fn create_monitor(&self, monitor: NewMonitor) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO monitors (user_id, url, mail, mail_notification,
                                  interval_minutes, status, is_active, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&monitor.user_id)
        .bind(&monitor.url)
        .bind(&monitor.mail)
        .bind(monitor.mail_notification)
        .bind(monitor.interval_minutes)
        .bind(monitor.is_active)
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn get_monitor(&self, id: i64) -> StoreResult<Option<MonitorRow>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, url, mail, mail_notification,
                   interval_minutes, status, is_active, updated_at
            FROM monitors
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(row.as_ref().map(Self::row_to_monitor))
    }

    #[instrument(skip(self))]
    async fn delete_monitor(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM monitors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MonitorNotFound(id));
        }

        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
