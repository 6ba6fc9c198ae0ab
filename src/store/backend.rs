//! Durable store trait definition
//!
//! This module defines the `MonitorStore` trait that all storage
//! implementations must implement.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::error::StoreResult;
use super::schema::{HistoryRow, MonitorRow, NewMonitor, StatusUpdate};

/// Trait for the relational store owning monitors and history
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared across the
/// scheduler and aggregator tasks.
///
/// ## Error Handling
///
/// Methods return `StoreResult<T>` which wraps `StoreError`.
/// Implementations should convert backend-specific errors to
/// `StoreError` variants.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Select monitors that are due for a check
    ///
    /// A monitor is due when it is active and
    /// `now >= updated_at + interval - grace`. The grace window absorbs
    /// scheduler jitter so a slightly-early tick does not skip monitors.
    /// Results are ordered by `updated_at` ascending so the longest-waiting
    /// monitors are dispatched first under backlog.
    async fn due_monitors(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> StoreResult<Vec<MonitorRow>>;

    /// Fetch the ids of all monitors currently present in the store
    ///
    /// Used by the aggregator to separate results for still-existing
    /// monitors from results whose monitor has been deleted.
    async fn monitor_ids(&self) -> StoreResult<HashSet<i64>>;

    /// Commit one aggregation run: append history rows and apply the
    /// batched per-monitor status update
    ///
    /// Both writes happen in a single transaction. On failure nothing is
    /// persisted and the caller must not delete the source batches, so
    /// the next run retries the same data.
    async fn commit_results(
        &self,
        history: Vec<HistoryRow>,
        updates: Vec<StatusUpdate>,
    ) -> StoreResult<()>;

    /// Query the N most recent history rows for a monitor
    ///
    /// This is the read path consumed by dashboards; tests use it to
    /// assert on committed runs. Results are ordered newest first.
    async fn query_history(&self, monitor_id: i64, limit: usize) -> StoreResult<Vec<HistoryRow>>;

    /// Create a monitor and return its id
    ///
    /// Monitor creation belongs to the external CRUD layer; the operation
    /// exists here as that layer's contract surface (and for tests).
    async fn create_monitor(&self, monitor: NewMonitor) -> StoreResult<i64>;

    /// Fetch a single monitor by id
    async fn get_monitor(&self, id: i64) -> StoreResult<Option<MonitorRow>>;

    /// Delete a monitor (history rows cascade)
    async fn delete_monitor(&self, id: i64) -> StoreResult<()>;

    /// Close the store and release resources
    async fn close(&self) -> StoreResult<()>;
}
