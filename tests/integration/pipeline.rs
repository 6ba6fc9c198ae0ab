//! End-to-end pipeline tests: scheduler -> queue -> checker -> cache ->
//! aggregator -> store (+ mail)

use std::sync::Arc;

use chrono::Utc;
use pretty_assertions::assert_eq;
use uptime_monitoring::MonitorStatus;
use uptime_monitoring::aggregator::Aggregator;
use uptime_monitoring::cache::{CHECK_PREFIX, EphemeralStore, MemoryCache};
use uptime_monitoring::checker::Checker;
use uptime_monitoring::probe::ProbeError;
use uptime_monitoring::queue::{MemoryQueue, MessageQueue};
use uptime_monitoring::scheduler::Scheduler;
use uptime_monitoring::store::{MonitorStore, NewMonitor};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{
    backdate, create_test_store, fast_checker_config, mails_received, mount_mail_api,
    test_aggregator_config, test_mail_config, test_mailer, test_scheduler_config,
};
use uptime_monitoring::mailer::Mailer;

#[tokio::test]
async fn test_healthy_monitor_full_round() {
    let (_dir, store) = create_test_store().await;
    let cache = Arc::new(MemoryCache::new());
    let queue = Arc::new(MemoryQueue::new());

    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&target)
        .await;

    let mail_server = MockServer::start().await;
    mount_mail_api(&mail_server).await;

    // interval 3 minutes, last updated 4 minutes ago, active
    let id = store
        .create_monitor(NewMonitor {
            user_id: "user-1".to_string(),
            url: target.uri(),
            mail: Some("ops@example.com".to_string()),
            mail_notification: true,
            interval_minutes: 3,
            is_active: true,
        })
        .await
        .unwrap();
    backdate(&store, id, 4).await;

    let scheduler = Scheduler::new(store.clone(), queue.clone(), test_scheduler_config());
    let checker = Checker::new(queue.clone(), cache.clone(), fast_checker_config());
    let aggregator = Aggregator::new(
        store.clone(),
        cache.clone(),
        test_mailer(&mail_server),
        test_aggregator_config(),
    );

    // scheduler tick selects and dispatches the monitor
    let report = scheduler.run_tick(Utc::now()).await.unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.published, 1);

    // checker consumes the message and buffers one batch
    let processed = checker.drain_once().await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(queue.in_flight_len(), 0);
    assert_eq!(cache.list(CHECK_PREFIX).await.unwrap().len(), 1);

    // aggregator commits the run
    let outcome = aggregator.run_tick(Utc::now()).await.unwrap();
    assert_eq!(outcome.valid_results, 1);
    assert_eq!(outcome.history_written, 1);
    assert_eq!(outcome.keys_deleted, 1);

    let history = store.query_history(id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, 200);
    assert!(history[0].latency_ms >= 0);

    let monitor = store.get_monitor(id).await.unwrap().unwrap();
    assert_eq!(monitor.status, MonitorStatus::Up);

    // a healthy monitor sends no mail
    assert_eq!(mails_received(&mail_server).await, 0);
}

#[tokio::test]
async fn test_timing_out_monitor_records_failure_and_alerts_once() {
    let (_dir, store) = create_test_store().await;
    let cache = Arc::new(MemoryCache::new());
    let queue = Arc::new(MemoryQueue::new());

    // target stalls past the 1s probe timeout; retry hits the same wall
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&target)
        .await;

    let mail_server = MockServer::start().await;
    mount_mail_api(&mail_server).await;

    let id = store
        .create_monitor(NewMonitor {
            user_id: "user-1".to_string(),
            url: target.uri(),
            mail: Some("ops@example.com".to_string()),
            mail_notification: true,
            interval_minutes: 3,
            is_active: true,
        })
        .await
        .unwrap();
    backdate(&store, id, 4).await;

    let scheduler = Scheduler::new(store.clone(), queue.clone(), test_scheduler_config());
    let checker = Checker::new(queue.clone(), cache.clone(), fast_checker_config());
    let aggregator = Aggregator::new(
        store.clone(),
        cache.clone(),
        test_mailer(&mail_server),
        test_aggregator_config(),
    );

    scheduler.run_tick(Utc::now()).await.unwrap();
    checker.drain_once().await.unwrap();

    let outcome = aggregator.run_tick(Utc::now()).await.unwrap();
    assert_eq!(outcome.history_written, 1);
    assert_eq!(outcome.alerts_sent, 1);
    assert_eq!(outcome.markers_created, 1);

    let history = store.query_history(id, 10).await.unwrap();
    assert_eq!(history[0].status, ProbeError::Timeout.code());

    let monitor = store.get_monitor(id).await.unwrap().unwrap();
    assert_eq!(monitor.status, MonitorStatus::Down);

    // exactly one mail for the downtime episode
    assert_eq!(mails_received(&mail_server).await, 1);

    // next round: still down, still only one mail
    backdate(&store, id, 4).await;
    scheduler.run_tick(Utc::now()).await.unwrap();
    checker.drain_once().await.unwrap();
    let second = aggregator.run_tick(Utc::now()).await.unwrap();

    assert_eq!(second.alerts_sent, 0);
    assert_eq!(mails_received(&mail_server).await, 1);
}

#[tokio::test]
async fn test_redelivered_message_produces_distinct_batches() {
    let (_dir, store) = create_test_store().await;
    let cache = Arc::new(MemoryCache::new());
    let queue = Arc::new(MemoryQueue::new());

    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let id = store
        .create_monitor(NewMonitor {
            user_id: "user-1".to_string(),
            url: target.uri(),
            mail: None,
            mail_notification: false,
            interval_minutes: 3,
            is_active: true,
        })
        .await
        .unwrap();
    backdate(&store, id, 4).await;

    let scheduler = Scheduler::new(store.clone(), queue.clone(), test_scheduler_config());
    let checker = Checker::new(queue.clone(), cache.clone(), fast_checker_config());

    scheduler.run_tick(Utc::now()).await.unwrap();

    // duplicate delivery: process the message, then force a redelivery
    // of the same body and process it again
    let message = queue.receive(1).await.unwrap().remove(0);
    checker.process_message(&message).await.unwrap();
    queue.retry(message.receipt).await.unwrap();
    checker.drain_once().await.unwrap();

    // two distinct keys, no overwrite
    let keys = cache.list(CHECK_PREFIX).await.unwrap();
    assert_eq!(keys.len(), 2);
}

#[tokio::test]
async fn test_mailer_posts_resend_shaped_payload() {
    let mail_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mail_server)
        .await;

    let mailer = Mailer::new(&test_mail_config(&mail_server), Some("key".to_string()));
    let payload = mailer.downtime_payload("ops@example.com", "https://example.com", Utc::now());
    assert!(mailer.send(&payload).await);

    let requests = mail_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["to"], "ops@example.com");
    assert!(body["subject"].as_str().unwrap().contains("Down"));
    assert!(body["html"].as_str().unwrap().contains("https://example.com"));
    assert!(body["from"].as_str().unwrap().contains("Uptime Monitoring"));
}
