//! At-least-once message queue between scheduler and checker
//!
//! The scheduler publishes one [`CheckDispatch`] per batch of monitors;
//! the checker receives messages and must settle each exactly once with
//! `ack` (done) or `retry` (redeliver the whole message). Delivery is
//! at-least-once: a message that is received but never settled stays
//! in flight, and `retry` puts it back at the end of the ready queue
//! with an incremented attempt counter.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::CheckDispatch;

pub use memory::MemoryQueue;

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur during queue operations
#[derive(Debug)]
pub enum QueueError {
    /// The queue backend rejected a publish
    PublishFailed(String),

    /// `ack`/`retry` referenced a receipt that is not in flight
    UnknownReceipt(Receipt),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::PublishFailed(msg) => write!(f, "queue publish failed: {}", msg),
            QueueError::UnknownReceipt(receipt) => {
                write!(f, "receipt {} is not in flight", receipt)
            }
        }
    }
}

impl std::error::Error for QueueError {}

/// Opaque handle identifying one in-flight delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Receipt(Uuid);

impl Receipt {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One received message awaiting ack or retry
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub receipt: Receipt,
    pub body: CheckDispatch,

    /// 1 for the first delivery, incremented on each retry
    pub attempt: u32,
}

/// Trait for the dispatch channel between scheduler and checker
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue one dispatch; failures affect only this batch
    async fn publish(&self, dispatch: CheckDispatch) -> QueueResult<()>;

    /// Receive up to `max` messages, moving them in flight
    ///
    /// Returns an empty vec when nothing is ready. Received messages stay
    /// in flight until settled with [`ack`](MessageQueue::ack) or
    /// [`retry`](MessageQueue::retry).
    async fn receive(&self, max: usize) -> QueueResult<Vec<QueueMessage>>;

    /// Settle a delivery as processed
    async fn ack(&self, receipt: Receipt) -> QueueResult<()>;

    /// Return a delivery to the ready queue for redelivery
    async fn retry(&self, receipt: Receipt) -> QueueResult<()>;
}
