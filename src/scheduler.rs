//! Scheduler - selects due monitors and fans them out
//!
//! On each timer tick the scheduler queries the durable store for
//! monitors whose interval has elapsed (minus a grace window absorbing
//! timer jitter), partitions them into fixed-size batches, and publishes
//! one queue message per batch.
//!
//! Publishing failures are per-batch: a failed publish is logged and the
//! other batches proceed. No retries happen within the tick; a failed
//! batch's monitors stay due and are selected again on the next tick.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, instrument, warn};

use crate::config::SchedulerConfig;
use crate::queue::MessageQueue;
use crate::store::MonitorStore;
use crate::{CheckDispatch, MonitorRef};

/// What one scheduler tick did
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SchedulerTickReport {
    /// Monitors selected as due
    pub selected: usize,

    /// Batches successfully published
    pub published: usize,

    /// Batches whose publish failed
    pub failed: usize,
}

pub struct Scheduler {
    store: Arc<dyn MonitorStore>,
    queue: Arc<dyn MessageQueue>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        queue: Arc<dyn MessageQueue>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Run the scheduler loop until shutdown
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        debug!("starting scheduler (tick: {}s)", self.config.tick_secs);

        let mut ticker = interval(std::time::Duration::from_secs(self.config.tick_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_tick(Utc::now()).await {
                        error!("scheduler tick failed: {:#}", e);
                    }
                }

                _ = shutdown.recv() => {
                    debug!("received shutdown signal");
                    break;
                }
            }
        }

        debug!("scheduler stopped");
    }

    /// One tick: select, partition, publish.
    ///
    /// Read-only against the store; the only side effect is message
    /// publication.
    #[instrument(skip(self), fields(now = %now))]
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Result<SchedulerTickReport> {
        let grace = Duration::seconds(self.config.grace_secs as i64);
        let due = self.store.due_monitors(now, grace).await?;

        if due.is_empty() {
            debug!("no monitors due");
            return Ok(SchedulerTickReport::default());
        }

        let monitors: Vec<MonitorRef> = due.iter().map(|row| row.to_ref()).collect();
        let mut report = SchedulerTickReport {
            selected: monitors.len(),
            ..Default::default()
        };

        for (index, batch) in monitors.chunks(self.config.batch_size).enumerate() {
            let dispatch = CheckDispatch {
                monitors: batch.to_vec(),
                dispatched_at: now,
            };

            match self.queue.publish(dispatch).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    // Monitors in this batch stay due; the next tick
                    // picks them up again.
                    warn!("failed to publish batch {}: {}", index + 1, e);
                    report.failed += 1;
                }
            }
        }

        debug!(
            "dispatched {} monitors in {} batches ({} failed)",
            report.selected, report.published, report.failed
        );

        Ok(report)
    }
}
