//! Row types for the monitors and history tables
//!
//! Timestamps are stored as Unix milliseconds in the database and exposed
//! as `DateTime<Utc>` on the Rust side. Monitor status is a nullable
//! boolean column (1 = up, 0 = down, NULL = never checked) wrapped in the
//! tri-state [`MonitorStatus`] enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CheckResult, MonitorRef, MonitorStatus};

/// A monitor record as read from the durable store.
///
/// Created and edited by the external CRUD layer; the pipeline only reads
/// it (scheduler) and updates `status`/`updated_at` (aggregator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorRow {
    pub id: i64,

    /// Owner reference (opaque to the pipeline)
    pub user_id: String,

    /// Target URL to probe
    pub url: String,

    /// Notification address, if any
    pub mail: Option<String>,

    /// Whether downtime mail is enabled
    pub mail_notification: bool,

    /// Check interval in minutes (> 0)
    pub interval_minutes: i64,

    /// Last known state
    pub status: MonitorStatus,

    pub is_active: bool,

    /// When the monitor state was last written by the aggregator
    pub updated_at: DateTime<Utc>,
}

impl MonitorRow {
    /// Project the fields that travel through the queue.
    pub fn to_ref(&self) -> MonitorRef {
        MonitorRef {
            id: self.id,
            url: self.url.clone(),
            mail: self.mail.clone(),
            notify: self.mail_notification,
        }
    }
}

/// Input for creating a monitor (exercised by tests and the external
/// CRUD collaborator).
#[derive(Debug, Clone)]
pub struct NewMonitor {
    pub user_id: String,
    pub url: String,
    pub mail: Option<String>,
    pub mail_notification: bool,
    pub interval_minutes: i64,
    pub is_active: bool,
}

/// One appended check-history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub monitor_id: i64,

    /// When the probe was observed
    pub timestamp: DateTime<Utc>,

    /// HTTP status code or negative probe error code
    pub status: i32,

    pub latency_ms: i64,
}

impl HistoryRow {
    pub fn from_result(result: &CheckResult) -> Self {
        Self {
            monitor_id: result.monitor_id,
            timestamp: result.observed_at,
            status: result.status,
            latency_ms: result.latency_ms,
        }
    }
}

/// One entry of the batched per-monitor state update.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub monitor_id: i64,
    pub status: MonitorStatus,
    pub updated_at: DateTime<Utc>,
}
