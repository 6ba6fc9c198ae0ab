//! In-memory implementation of the message queue
//!
//! A ready deque plus an in-flight map keyed by receipt. Process-local,
//! like the memory cache; a broker-backed queue can implement the same
//! trait for multi-node deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::trace;

use crate::CheckDispatch;

use super::{MessageQueue, QueueError, QueueMessage, QueueResult, Receipt};

#[derive(Default)]
struct Inner {
    ready: VecDeque<(CheckDispatch, u32)>,
    in_flight: HashMap<Receipt, (CheckDispatch, u32)>,
}

/// Process-local at-least-once queue
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of messages waiting for delivery (test/introspection helper)
    pub fn ready_len(&self) -> usize {
        self.lock().ready.len()
    }

    /// Number of received-but-unsettled messages
    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, dispatch: CheckDispatch) -> QueueResult<()> {
        trace!(
            "publishing batch of {} monitors",
            dispatch.monitors.len()
        );

        self.lock().ready.push_back((dispatch, 0));
        Ok(())
    }

    async fn receive(&self, max: usize) -> QueueResult<Vec<QueueMessage>> {
        let mut inner = self.lock();

        let mut messages = Vec::new();
        while messages.len() < max {
            let Some((body, retries)) = inner.ready.pop_front() else {
                break;
            };

            let receipt = Receipt::fresh();
            inner.in_flight.insert(receipt, (body.clone(), retries));
            messages.push(QueueMessage {
                receipt,
                body,
                attempt: retries + 1,
            });
        }

        Ok(messages)
    }

    async fn ack(&self, receipt: Receipt) -> QueueResult<()> {
        trace!("ack {receipt}");

        self.lock()
            .in_flight
            .remove(&receipt)
            .map(|_| ())
            .ok_or(QueueError::UnknownReceipt(receipt))
    }

    async fn retry(&self, receipt: Receipt) -> QueueResult<()> {
        trace!("retry {receipt}");

        let mut inner = self.lock();
        let (body, retries) = inner
            .in_flight
            .remove(&receipt)
            .ok_or(QueueError::UnknownReceipt(receipt))?;

        inner.ready.push_back((body, retries + 1));
        Ok(())
    }
}
