//! Aggregator - reconciles buffered check results with durable storage
//!
//! On each timer tick the aggregator:
//!
//! 1. **Alert GC**: clears cooldown markers older than the configured
//!    window when recovery evidence (a 200 for that monitor) appears
//!    among the still-pending check batches.
//! 2. **Drain**: collects all buffered batches; unparsable or empty ones
//!    are kept aside for the next pass instead of being merged.
//! 3. **Reconcile**: drops results whose monitor no longer exists and
//!    cleans up their alert markers.
//! 4. **Commit**: appends history rows and applies the last-write-wins
//!    per-monitor status update in a single transaction.
//! 5. **Alerting**: sends deduplicated downtime mail; a cooldown marker
//!    is created before any send so duplicate processing cannot
//!    double-send.
//! 6. **Cleanup**: deletes the drained batch keys, but only after the
//!    commit succeeded.
//!
//! The delete-after-commit ordering gives at-least-once semantics: a
//! crash between commit and cleanup only causes the next tick to
//! reprocess the same batches, which duplicates history rows but leaves
//! monitor state and alert dedup unchanged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, instrument, warn};

use crate::cache::{ALERT_PREFIX, AlertKey, CHECK_PREFIX, EphemeralStore};
use crate::config::AggregatorConfig;
use crate::mailer::{MailPayload, Mailer};
use crate::store::{HistoryRow, MonitorStore, StatusUpdate};
use crate::{CheckResult, MonitorStatus};

/// What one aggregation tick did
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    /// Results flattened out of successfully parsed batches
    pub merged_results: usize,

    /// Results whose monitor still exists
    pub valid_results: usize,

    /// Results whose monitor has been deleted
    pub orphaned_results: usize,

    /// Batch keys that failed to fetch or parse (left in place)
    pub failed_keys: Vec<String>,

    /// History rows written
    pub history_written: usize,

    /// Monitors whose status/updated_at changed
    pub monitors_updated: usize,

    /// Downtime mails accepted by the provider
    pub alerts_sent: usize,

    /// Cooldown markers created this tick
    pub markers_created: usize,

    /// Cooldown markers removed (recovery or orphan cleanup)
    pub markers_cleared: usize,

    /// Batch keys deleted after a successful commit
    pub keys_deleted: usize,
}

struct DrainedBatches {
    results: Vec<CheckResult>,
    processed_keys: Vec<String>,
}

pub struct Aggregator {
    store: Arc<dyn MonitorStore>,
    cache: Arc<dyn EphemeralStore>,
    mailer: Mailer,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        cache: Arc<dyn EphemeralStore>,
        mailer: Mailer,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            store,
            cache,
            mailer,
            config,
        }
    }

    /// Run the aggregation loop until shutdown
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        debug!("starting aggregator (tick: {}s)", self.config.tick_secs);

        let mut ticker = interval(std::time::Duration::from_secs(self.config.tick_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_tick(Utc::now()).await {
                        error!("aggregation tick failed: {:#}", e);
                    }
                }

                _ = shutdown.recv() => {
                    debug!("received shutdown signal");
                    break;
                }
            }
        }

        debug!("aggregator stopped");
    }

    /// One aggregation pass.
    #[instrument(skip(self), fields(now = %now))]
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<AggregateOutcome> {
        let mut outcome = AggregateOutcome::default();

        self.collect_expired_alerts(now, &mut outcome).await?;

        let drained = self.drain_batches(&mut outcome).await?;
        outcome.merged_results = drained.results.len();
        if drained.results.is_empty() {
            return Ok(outcome);
        }

        let monitor_ids = self.store.monitor_ids().await?;
        let (valid, orphaned): (Vec<CheckResult>, Vec<CheckResult>) = drained
            .results
            .into_iter()
            .partition(|result| monitor_ids.contains(&result.monitor_id));
        outcome.valid_results = valid.len();
        outcome.orphaned_results = orphaned.len();

        self.clean_orphaned_markers(&orphaned, &mut outcome).await?;

        if valid.is_empty() {
            debug!("no valid results left after reconciliation");
            self.delete_keys(&drained.processed_keys, &mut outcome).await;
            return Ok(outcome);
        }

        // Commit before alerting and cleanup; a failure here propagates
        // and leaves every batch in place for the next tick.
        self.commit(&valid, &mut outcome).await?;

        self.dispatch_alerts(&valid, now, &mut outcome).await?;

        self.delete_keys(&drained.processed_keys, &mut outcome).await;

        debug!(
            "tick complete: {} results merged, {} history rows, {} alerts",
            outcome.merged_results, outcome.history_written, outcome.alerts_sent
        );

        Ok(outcome)
    }

    /// Alert GC: clear cooldown markers past the window once the monitor
    /// shows a 200 among the pending batches.
    async fn collect_expired_alerts(
        &self,
        now: DateTime<Utc>,
        outcome: &mut AggregateOutcome,
    ) -> Result<()> {
        let cooldown = Duration::minutes(self.config.alert_cooldown_minutes);
        let alert_keys = self.cache.list(ALERT_PREFIX).await?;

        // Pending batches are only fetched once a marker actually needs
        // the recovery scan.
        let mut pending: Option<Vec<Vec<CheckResult>>> = None;

        for raw in alert_keys {
            let key = match AlertKey::parse(&raw) {
                Ok(key) => key,
                Err(e) => {
                    warn!("skipping malformed alert key: {e}");
                    continue;
                }
            };

            if key.age(now) <= cooldown {
                continue;
            }

            if pending.is_none() {
                pending = Some(self.fetch_pending_batches().await?);
            }

            let recovered = pending
                .as_ref()
                .map(|batches| {
                    batches.iter().flatten().any(|result| {
                        result.monitor_id == key.monitor_id && result.status == 200
                    })
                })
                .unwrap_or(false);

            if recovered {
                self.cache.delete(&raw).await?;
                outcome.markers_cleared += 1;
                debug!("cleared alert marker for monitor {}", key.monitor_id);
            }
        }

        Ok(())
    }

    async fn fetch_pending_batches(&self) -> Result<Vec<Vec<CheckResult>>> {
        let mut batches = Vec::new();
        for key in self.cache.list(CHECK_PREFIX).await? {
            if let Some(value) = self.cache.get(&key).await? {
                if let Ok(results) = serde_json::from_str::<Vec<CheckResult>>(&value) {
                    batches.push(results);
                }
            }
        }
        Ok(batches)
    }

    /// Drain: flatten all parsable batches into one working set.
    async fn drain_batches(&self, outcome: &mut AggregateOutcome) -> Result<DrainedBatches> {
        let mut results = Vec::new();
        let mut processed_keys = Vec::new();

        for key in self.cache.list(CHECK_PREFIX).await? {
            match self.cache.get(&key).await? {
                Some(value) => match serde_json::from_str::<Vec<CheckResult>>(&value) {
                    Ok(batch) if !batch.is_empty() => {
                        results.extend(batch);
                        processed_keys.push(key);
                    }
                    Ok(_) => {
                        warn!("batch {key} is empty, leaving for inspection");
                        outcome.failed_keys.push(key);
                    }
                    Err(e) => {
                        warn!("batch {key} failed to parse: {e}, leaving for inspection");
                        outcome.failed_keys.push(key);
                    }
                },
                // Expired between list and get
                None => outcome.failed_keys.push(key),
            }
        }

        Ok(DrainedBatches {
            results,
            processed_keys,
        })
    }

    /// Reconciliation cleanup: markers of deleted monitors are removed.
    async fn clean_orphaned_markers(
        &self,
        orphaned: &[CheckResult],
        outcome: &mut AggregateOutcome,
    ) -> Result<()> {
        if orphaned.is_empty() {
            return Ok(());
        }

        debug!(
            "found {} results for deleted monitors, cleaning up",
            orphaned.len()
        );

        let orphaned_ids: HashSet<i64> = orphaned.iter().map(|r| r.monitor_id).collect();
        for id in orphaned_ids {
            for key in self.cache.list(&AlertKey::prefix_for(id)).await? {
                self.cache.delete(&key).await?;
                outcome.markers_cleared += 1;
                debug!("deleted orphaned alert key: {key}");
            }
        }

        Ok(())
    }

    /// Commit: history rows plus the batched status update, atomically.
    async fn commit(&self, valid: &[CheckResult], outcome: &mut AggregateOutcome) -> Result<()> {
        let history: Vec<HistoryRow> = valid.iter().map(HistoryRow::from_result).collect();

        // Last write wins per monitor: the newest observation decides
        // the dashboard state.
        let mut latest: HashMap<i64, (DateTime<Utc>, i32)> = HashMap::new();
        for result in valid {
            let entry = latest.entry(result.monitor_id).or_insert((result.observed_at, result.status));
            if result.observed_at > entry.0 {
                *entry = (result.observed_at, result.status);
            }
        }

        let updates: Vec<StatusUpdate> = latest
            .into_iter()
            .map(|(monitor_id, (observed_at, status))| StatusUpdate {
                monitor_id,
                status: MonitorStatus::from_code(status),
                updated_at: observed_at,
            })
            .collect();

        outcome.history_written = history.len();
        outcome.monitors_updated = updates.len();

        self.store.commit_results(history, updates).await?;
        Ok(())
    }

    /// Alerting: deduplicated downtime mail. The marker is created before
    /// anything is sent, so a concurrent or repeated pass sees it and
    /// stays silent.
    async fn dispatch_alerts(
        &self,
        valid: &[CheckResult],
        now: DateTime<Utc>,
        outcome: &mut AggregateOutcome,
    ) -> Result<()> {
        let mut payloads: Vec<MailPayload> = Vec::new();

        for result in valid {
            if result.status == 200 || !result.notify {
                continue;
            }
            let Some(mail) = &result.mail else {
                continue;
            };

            let existing = self
                .cache
                .list(&AlertKey::prefix_for(result.monitor_id))
                .await?;
            if !existing.is_empty() {
                continue;
            }

            payloads.push(self.mailer.downtime_payload(mail, &result.url, now));

            let marker = AlertKey::new(result.monitor_id, now);
            self.cache.put(&marker.to_string(), "1".to_string(), None).await?;
            outcome.markers_created += 1;
        }

        if !payloads.is_empty() {
            outcome.alerts_sent = self.mailer.send_batches(payloads).await;
        }

        Ok(())
    }

    /// Cleanup: drop the drained keys. Failures are logged only; a key
    /// that survives is reprocessed next tick, which is safe.
    async fn delete_keys(&self, keys: &[String], outcome: &mut AggregateOutcome) {
        for key in keys {
            match self.cache.delete(key).await {
                Ok(()) => outcome.keys_deleted += 1,
                Err(e) => warn!("failed to delete {key}: {e}"),
            }
        }
    }
}
