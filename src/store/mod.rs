//! Durable storage for monitors and check history
//!
//! This module provides a trait-based abstraction over the relational
//! store that owns the `monitors` and `history` tables.
//!
//! ## Design
//!
//! - **Trait-based**: `MonitorStore` allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio
//! - **Batch-oriented**: History inserts and status updates are committed
//!   together in a single transaction per aggregation run
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database, WAL mode, pooled connections

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::MonitorStore;
pub use error::{StoreError, StoreResult};
pub use schema::{HistoryRow, MonitorRow, NewMonitor, StatusUpdate};
