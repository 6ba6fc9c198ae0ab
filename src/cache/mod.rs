//! Ephemeral TTL key/value store
//!
//! The cache is the write-ahead buffer between the checker and the
//! aggregator, and the ledger for alert-cooldown markers. Entries are
//! transient working state only; the durable store stays authoritative.
//!
//! ## Contract
//!
//! - `list(prefix)` returns matching keys (lexicographic order)
//! - `get`/`put`/`delete` operate on single keys
//! - `put` accepts an optional TTL after which the entry disappears
//! - No compare-and-swap is assumed or required; correctness upstream
//!   relies on unique keys per produced batch and delete-after-commit
//!   ordering

pub mod error;
pub mod keys;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

pub use error::{CacheError, CacheResult};
pub use keys::{ALERT_PREFIX, AlertKey, CHECK_PREFIX, CheckKey, KeyError};
pub use memory::MemoryCache;

/// Trait for the key-prefixed, TTL-expiring cache
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// List all keys starting with `prefix`, in lexicographic order
    async fn list(&self, prefix: &str) -> CacheResult<Vec<String>>;

    /// Fetch the value for `key`, or `None` if absent or expired
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl` if given
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> CacheResult<()>;
}
