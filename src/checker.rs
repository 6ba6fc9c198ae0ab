//! Checker - queue consumer performing the actual probes
//!
//! For each queue message the checker probes every monitor concurrently,
//! collects the results into one batch, and writes the batch to the
//! ephemeral store under a key carrying the dispatch timestamp plus a
//! fresh nonce. The message is acknowledged only after the write
//! succeeds; any failure settles the message with `retry` so the whole
//! batch is redelivered.
//!
//! Re-probing is naturally idempotent, and the fresh nonce means a
//! redelivered message writes a new, distinct batch instead of
//! colliding with a previous one. Deduplication is the aggregator's
//! job downstream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::cache::{CheckKey, EphemeralStore};
use crate::config::CheckerConfig;
use crate::probe::Prober;
use crate::queue::{MessageQueue, QueueMessage};
use crate::{CheckResult, MonitorRef};

pub struct Checker {
    queue: Arc<dyn MessageQueue>,
    cache: Arc<dyn EphemeralStore>,
    prober: Prober,
    config: CheckerConfig,
}

impl Checker {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        cache: Arc<dyn EphemeralStore>,
        config: CheckerConfig,
    ) -> Self {
        Self {
            queue,
            cache,
            prober: Prober::new(&config),
            config,
        }
    }

    /// Run the consumer loop until shutdown
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        debug!("starting checker (poll: {}s)", self.config.poll_secs);

        let mut ticker = interval(Duration::from_secs(self.config.poll_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_once().await {
                        error!("checker poll failed: {:#}", e);
                    }
                }

                _ = shutdown.recv() => {
                    debug!("received shutdown signal");
                    break;
                }
            }
        }

        debug!("checker stopped");
    }

    /// Receive one round of messages and settle each exactly once.
    pub async fn drain_once(&self) -> Result<usize> {
        let messages = self.queue.receive(self.config.receive_limit).await?;
        if messages.is_empty() {
            return Ok(0);
        }

        let started = Instant::now();

        for message in &messages {
            match self.process_message(message).await {
                Ok(key) => {
                    trace!("stored batch {key}");
                    self.queue.ack(message.receipt).await?;
                }
                Err(e) => {
                    error!("error processing batch: {:#}", e);
                    self.queue.retry(message.receipt).await?;
                }
            }
        }

        debug!(
            "finished processing {} messages in {}ms",
            messages.len(),
            started.elapsed().as_millis()
        );

        Ok(messages.len())
    }

    /// Probe all monitors of one message and buffer the results.
    #[instrument(skip(self, message), fields(monitors = message.body.monitors.len(), attempt = message.attempt))]
    pub async fn process_message(&self, message: &QueueMessage) -> Result<CheckKey> {
        // Observability watchdog only: a hung probe is logged, in-flight
        // work is never cancelled.
        let soft_timeout = Duration::from_secs(self.config.message_timeout_secs);
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(soft_timeout).await;
            warn!(
                "message processing exceeded {}s - still waiting for probes",
                soft_timeout.as_secs()
            );
        });

        let results = join_all(
            message
                .body
                .monitors
                .iter()
                .map(|monitor| self.probe_monitor(monitor)),
        )
        .await;

        watchdog.abort();

        let key = CheckKey::generate(message.body.dispatched_at);
        let value = serde_json::to_string(&results).context("failed to serialize check results")?;

        self.cache
            .put(
                &key.to_string(),
                value,
                Some(Duration::from_secs(self.config.batch_ttl_secs)),
            )
            .await
            .context("failed to store check results")?;

        Ok(key)
    }

    async fn probe_monitor(&self, monitor: &MonitorRef) -> CheckResult {
        let started = Instant::now();
        let status = self.prober.check(&monitor.url).await;

        // Latency spans the whole check, retry and backoff included.
        let latency_ms = started.elapsed().as_millis() as i64;

        trace!("{}: {} ({}ms)", monitor.url, status, latency_ms);

        CheckResult {
            monitor_id: monitor.id,
            url: monitor.url.clone(),
            mail: monitor.mail.clone(),
            notify: monitor.notify,
            status,
            latency_ms,
            observed_at: Utc::now(),
        }
    }
}
