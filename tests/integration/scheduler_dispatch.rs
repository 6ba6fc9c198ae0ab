//! Integration tests for scheduler selection and batching
//!
//! These tests verify that:
//! - Due monitors are selected, inactive and fresh ones are not
//! - The selection is partitioned into fixed-size batches
//! - Batches carry the dispatch timestamp of the tick

use std::sync::Arc;

use chrono::Utc;
use uptime_monitoring::queue::{MemoryQueue, MessageQueue};
use uptime_monitoring::scheduler::Scheduler;
use uptime_monitoring::store::MonitorStore;

use crate::helpers::{backdate, create_silent_monitor, create_test_monitor, create_test_store, test_scheduler_config};

#[tokio::test]
async fn test_due_monitors_are_partitioned_into_batches() {
    let (_dir, store) = create_test_store().await;
    let queue = Arc::new(MemoryQueue::new());

    for i in 0..9 {
        let id = store
            .create_monitor(create_test_monitor(&format!("https://m{i}.example.com")))
            .await
            .unwrap();
        backdate(&store, id, 10).await;
    }

    let scheduler = Scheduler::new(store.clone(), queue.clone(), test_scheduler_config());

    let now = Utc::now();
    let report = scheduler.run_tick(now).await.unwrap();

    assert_eq!(report.selected, 9);
    assert_eq!(report.published, 3);
    assert_eq!(report.failed, 0);

    let messages = queue.receive(10).await.unwrap();
    let sizes: Vec<usize> = messages.iter().map(|m| m.body.monitors.len()).collect();
    assert_eq!(sizes, vec![4, 4, 1]);

    for message in &messages {
        assert_eq!(message.body.dispatched_at, now);
    }
}

#[tokio::test]
async fn test_inactive_monitors_are_never_selected() {
    let (_dir, store) = create_test_store().await;
    let queue = Arc::new(MemoryQueue::new());

    let mut monitor = create_test_monitor("https://inactive.example.com");
    monitor.is_active = false;
    let id = store.create_monitor(monitor).await.unwrap();
    backdate(&store, id, 600).await;

    let scheduler = Scheduler::new(store.clone(), queue.clone(), test_scheduler_config());
    let report = scheduler.run_tick(Utc::now()).await.unwrap();

    assert_eq!(report.selected, 0);
    assert_eq!(queue.ready_len(), 0);
}

#[tokio::test]
async fn test_fresh_monitors_are_not_selected() {
    let (_dir, store) = create_test_store().await;
    let queue = Arc::new(MemoryQueue::new());

    // updated_at is "now" on creation; interval has not elapsed
    store
        .create_monitor(create_silent_monitor("https://fresh.example.com"))
        .await
        .unwrap();

    let scheduler = Scheduler::new(store.clone(), queue.clone(), test_scheduler_config());
    let report = scheduler.run_tick(Utc::now()).await.unwrap();

    assert_eq!(report.selected, 0);
    assert_eq!(queue.ready_len(), 0);
}

#[tokio::test]
async fn test_overdue_monitor_is_selected() {
    let (_dir, store) = create_test_store().await;
    let queue = Arc::new(MemoryQueue::new());

    // interval 3 minutes, last updated 4 minutes ago
    let id = store
        .create_monitor(create_test_monitor("https://due.example.com"))
        .await
        .unwrap();
    backdate(&store, id, 4).await;

    let scheduler = Scheduler::new(store.clone(), queue.clone(), test_scheduler_config());
    let report = scheduler.run_tick(Utc::now()).await.unwrap();

    assert_eq!(report.selected, 1);
    assert_eq!(report.published, 1);

    let messages = queue.receive(1).await.unwrap();
    assert_eq!(messages[0].body.monitors[0].id, id);
    assert_eq!(messages[0].body.monitors[0].url, "https://due.example.com");
}
