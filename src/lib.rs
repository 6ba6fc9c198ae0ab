pub mod aggregator;
pub mod cache;
pub mod checker;
pub mod config;
pub mod mailer;
pub mod probe;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known state of a monitor as shown on dashboards.
///
/// Stored as a nullable boolean column: `Up` = 1, `Down` = 0,
/// `Unknown` = NULL (never checked).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Up,
    Down,
    Unknown,
}

impl MonitorStatus {
    /// Derive the monitor state from a recorded check status code.
    pub fn from_code(code: i32) -> Self {
        if code == 200 {
            MonitorStatus::Up
        } else {
            MonitorStatus::Down
        }
    }

    pub fn as_column(self) -> Option<bool> {
        match self {
            MonitorStatus::Up => Some(true),
            MonitorStatus::Down => Some(false),
            MonitorStatus::Unknown => None,
        }
    }

    pub fn from_column(value: Option<bool>) -> Self {
        match value {
            Some(true) => MonitorStatus::Up,
            Some(false) => MonitorStatus::Down,
            None => MonitorStatus::Unknown,
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
            MonitorStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// The slice of a monitor record that travels through the queue.
///
/// Carried alongside each check so the aggregator can dispatch alert mail
/// without re-reading the monitor table for every result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRef {
    pub id: i64,
    pub url: String,
    pub mail: Option<String>,
    pub notify: bool,
}

/// Queue message: one batch of monitors to probe, stamped with the
/// scheduler tick that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDispatch {
    pub monitors: Vec<MonitorRef>,
    pub dispatched_at: DateTime<Utc>,
}

/// Outcome of a single probe, as buffered in the ephemeral store.
///
/// `status` is either an HTTP status code or one of the negative probe
/// error codes (see [`probe::ProbeError`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub monitor_id: i64,
    pub url: String,
    pub mail: Option<String>,
    pub notify: bool,
    pub status: i32,
    pub latency_ms: i64,
    pub observed_at: DateTime<Utc>,
}
