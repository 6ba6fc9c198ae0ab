//! Typed key builders for the ephemeral store namespaces
//!
//! The cache holds two namespaces: `checks:` for buffered check-result
//! batches and `alert:` for downtime-alert cooldown markers. Keys are
//! built and parsed through these types instead of ad hoc string
//! concatenation, so a malformed key is a parse error at the boundary
//! rather than a silent mis-split later.
//!
//! Formats:
//!
//! ```text
//! checks:<dispatch timestamp, RFC 3339>:<uuid v4>
//! alert:<monitor id>:<creation timestamp, unix millis>
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Namespace prefix for check-result batches
pub const CHECK_PREFIX: &str = "checks:";

/// Namespace prefix for alert-cooldown markers
pub const ALERT_PREFIX: &str = "alert:";

/// Errors raised when a raw cache key does not round-trip
#[derive(Debug, PartialEq, Eq)]
pub enum KeyError {
    /// The key does not start with the expected namespace prefix
    WrongNamespace,

    /// The key body does not match the expected shape
    Malformed(String),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::WrongNamespace => write!(f, "key is outside the expected namespace"),
            KeyError::Malformed(key) => write!(f, "malformed cache key: {}", key),
        }
    }
}

impl std::error::Error for KeyError {}

/// Key of one buffered check-result batch
///
/// The nonce makes keys unique across retried or duplicate queue
/// deliveries: a redelivered message produces a new, distinct batch
/// instead of overwriting a prior one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckKey {
    pub dispatched_at: DateTime<Utc>,
    pub nonce: Uuid,
}

impl CheckKey {
    pub fn new(dispatched_at: DateTime<Utc>, nonce: Uuid) -> Self {
        Self {
            dispatched_at,
            nonce,
        }
    }

    /// Build a key with a fresh random nonce.
    pub fn generate(dispatched_at: DateTime<Utc>) -> Self {
        Self::new(dispatched_at, Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let body = raw.strip_prefix(CHECK_PREFIX).ok_or(KeyError::WrongNamespace)?;

        // The timestamp itself contains colons, so split off the nonce
        // from the right.
        let (timestamp, nonce) = body
            .rsplit_once(':')
            .ok_or_else(|| KeyError::Malformed(raw.to_string()))?;

        let dispatched_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| KeyError::Malformed(raw.to_string()))?
            .with_timezone(&Utc);
        let nonce = Uuid::parse_str(nonce).map_err(|_| KeyError::Malformed(raw.to_string()))?;

        Ok(Self {
            dispatched_at,
            nonce,
        })
    }
}

impl fmt::Display for CheckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}",
            CHECK_PREFIX,
            self.dispatched_at.to_rfc3339(),
            self.nonce
        )
    }
}

/// Key of one alert-cooldown marker
///
/// One marker per monitor suppresses repeat downtime mail; the creation
/// timestamp in the key drives the garbage-collection age check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertKey {
    pub monitor_id: i64,
    pub created_at: DateTime<Utc>,
}

impl AlertKey {
    pub fn new(monitor_id: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            monitor_id,
            // millisecond precision so the key round-trips
            created_at: DateTime::from_timestamp_millis(created_at.timestamp_millis())
                .unwrap_or(created_at),
        }
    }

    /// List prefix matching every marker for one monitor.
    pub fn prefix_for(monitor_id: i64) -> String {
        format!("{}{}:", ALERT_PREFIX, monitor_id)
    }

    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let body = raw.strip_prefix(ALERT_PREFIX).ok_or(KeyError::WrongNamespace)?;

        let (id, millis) = body
            .split_once(':')
            .ok_or_else(|| KeyError::Malformed(raw.to_string()))?;

        let monitor_id: i64 = id.parse().map_err(|_| KeyError::Malformed(raw.to_string()))?;
        let millis: i64 = millis
            .parse()
            .map_err(|_| KeyError::Malformed(raw.to_string()))?;
        let created_at = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| KeyError::Malformed(raw.to_string()))?;

        Ok(Self {
            monitor_id,
            created_at,
        })
    }

    /// Marker age relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}",
            ALERT_PREFIX,
            self.monitor_id,
            self.created_at.timestamp_millis()
        )
    }
}
