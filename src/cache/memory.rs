//! In-memory implementation of the ephemeral store
//!
//! Entries live in a process-local map with lazy TTL expiry: expired
//! entries are purged whenever the map is touched, so no background
//! sweeper task is needed. Suitable for single-process deployments and
//! tests; a networked cache can implement the same trait for multi-node
//! setups.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::trace;

use super::error::CacheResult;
use super::EphemeralStore;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Process-local TTL key/value store
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
    }
}

#[async_trait]
impl EphemeralStore for MemoryCache {
    async fn list(&self, prefix: &str) -> CacheResult<Vec<String>> {
        let mut entries = self.lock();
        Self::purge_expired(&mut entries);

        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();

        Ok(keys)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.lock();
        Self::purge_expired(&mut entries);

        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        trace!("put {key} (ttl: {ttl:?})");

        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };

        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        trace!("delete {key}");

        self.lock().remove(key);
        Ok(())
    }
}
