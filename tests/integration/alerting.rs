//! Integration tests for alert dedup, cooldown and recovery
//!
//! These tests verify that:
//! - An active marker younger than the cooldown suppresses repeat mail
//! - A marker past the cooldown is cleared when recovery evidence is
//!   present among pending batches, re-arming alerts
//! - The marker is created before any send, deduplicating within a tick
//! - Mail failures never block history writes

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use uptime_monitoring::MonitorStatus;
use uptime_monitoring::aggregator::Aggregator;
use uptime_monitoring::cache::{AlertKey, EphemeralStore, MemoryCache};
use uptime_monitoring::store::MonitorStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{
    create_test_monitor, create_test_store, mails_received, make_result, mount_mail_api,
    put_batch, test_aggregator_config, test_mailer,
};

#[tokio::test]
async fn test_active_marker_suppresses_repeat_mail() {
    let (_dir, store) = create_test_store().await;
    let cache = Arc::new(MemoryCache::new());
    let mail_server = MockServer::start().await;
    mount_mail_api(&mail_server).await;

    let id = store
        .create_monitor(create_test_monitor("https://example.com"))
        .await
        .unwrap();

    let now = Utc::now();

    // monitor already alerted half an hour ago
    let marker = AlertKey::new(id, now - Duration::minutes(30));
    cache
        .put(&marker.to_string(), "1".to_string(), None)
        .await
        .unwrap();

    put_batch(&cache, &[make_result(id, 503, now)]).await;

    let aggregator = Aggregator::new(
        store.clone(),
        cache.clone(),
        test_mailer(&mail_server),
        test_aggregator_config(),
    );
    let outcome = aggregator.run_tick(now).await.unwrap();

    // downtime is still recorded, but no second mail goes out
    assert_eq!(outcome.history_written, 1);
    assert_eq!(outcome.alerts_sent, 0);
    assert_eq!(outcome.markers_created, 0);
    assert_eq!(mails_received(&mail_server).await, 0);

    // the young marker survives untouched
    assert!(cache.get(&marker.to_string()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_expired_marker_cleared_on_recovery_then_realerts() {
    let (_dir, store) = create_test_store().await;
    let cache = Arc::new(MemoryCache::new());
    let mail_server = MockServer::start().await;
    mount_mail_api(&mail_server).await;

    let id = store
        .create_monitor(create_test_monitor("https://example.com"))
        .await
        .unwrap();

    let now = Utc::now();

    // marker past the 2h cooldown + a pending 200 for the same monitor
    let stale_marker = AlertKey::new(id, now - Duration::hours(3));
    cache
        .put(&stale_marker.to_string(), "1".to_string(), None)
        .await
        .unwrap();
    put_batch(&cache, &[make_result(id, 200, now)]).await;

    let aggregator = Aggregator::new(
        store.clone(),
        cache.clone(),
        test_mailer(&mail_server),
        test_aggregator_config(),
    );

    let recovery_tick = aggregator.run_tick(now).await.unwrap();
    assert_eq!(recovery_tick.markers_cleared, 1);
    assert_eq!(recovery_tick.alerts_sent, 0);
    assert!(cache.get(&stale_marker.to_string()).await.unwrap().is_none());

    // the monitor goes down again later: a fresh alert fires
    let later = now + Duration::minutes(5);
    put_batch(&cache, &[make_result(id, 503, later)]).await;

    let down_tick = aggregator.run_tick(later).await.unwrap();
    assert_eq!(down_tick.alerts_sent, 1);
    assert_eq!(down_tick.markers_created, 1);
    assert_eq!(mails_received(&mail_server).await, 1);
}

#[tokio::test]
async fn test_expired_marker_without_recovery_evidence_survives() {
    let (_dir, store) = create_test_store().await;
    let cache = Arc::new(MemoryCache::new());
    let mail_server = MockServer::start().await;
    mount_mail_api(&mail_server).await;

    let id = store
        .create_monitor(create_test_monitor("https://example.com"))
        .await
        .unwrap();

    let now = Utc::now();
    let stale_marker = AlertKey::new(id, now - Duration::hours(3));
    cache
        .put(&stale_marker.to_string(), "1".to_string(), None)
        .await
        .unwrap();

    // pending batch shows the monitor still down
    put_batch(&cache, &[make_result(id, 503, now)]).await;

    let aggregator = Aggregator::new(
        store.clone(),
        cache.clone(),
        test_mailer(&mail_server),
        test_aggregator_config(),
    );
    let outcome = aggregator.run_tick(now).await.unwrap();

    // no recovery evidence: the marker stays and keeps suppressing
    assert_eq!(outcome.markers_cleared, 0);
    assert_eq!(outcome.alerts_sent, 0);
    assert!(cache.get(&stale_marker.to_string()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_multiple_failures_in_one_tick_send_one_mail() {
    let (_dir, store) = create_test_store().await;
    let cache = Arc::new(MemoryCache::new());
    let mail_server = MockServer::start().await;
    mount_mail_api(&mail_server).await;

    let id = store
        .create_monitor(create_test_monitor("https://example.com"))
        .await
        .unwrap();

    let now = Utc::now();
    // two failing observations for the same monitor in the same drain
    put_batch(&cache, &[make_result(id, 503, now - Duration::seconds(30))]).await;
    put_batch(&cache, &[make_result(id, -2, now)]).await;

    let aggregator = Aggregator::new(
        store.clone(),
        cache.clone(),
        test_mailer(&mail_server),
        test_aggregator_config(),
    );
    let outcome = aggregator.run_tick(now).await.unwrap();

    // marker creation gates the second payload
    assert_eq!(outcome.markers_created, 1);
    assert_eq!(outcome.alerts_sent, 1);
    assert_eq!(mails_received(&mail_server).await, 1);
}

#[tokio::test]
async fn test_no_mail_without_notification_settings() {
    let (_dir, store) = create_test_store().await;
    let cache = Arc::new(MemoryCache::new());
    let mail_server = MockServer::start().await;
    mount_mail_api(&mail_server).await;

    let id = store
        .create_monitor(create_test_monitor("https://example.com"))
        .await
        .unwrap();

    let now = Utc::now();
    let mut muted = make_result(id, 503, now);
    muted.notify = false;
    let mut addressless = make_result(id, 503, now);
    addressless.mail = None;
    put_batch(&cache, &[muted, addressless]).await;

    let aggregator = Aggregator::new(
        store.clone(),
        cache.clone(),
        test_mailer(&mail_server),
        test_aggregator_config(),
    );
    let outcome = aggregator.run_tick(now).await.unwrap();

    assert_eq!(outcome.alerts_sent, 0);
    assert_eq!(outcome.markers_created, 0);
    assert_eq!(mails_received(&mail_server).await, 0);
    // the downtime is still recorded
    assert_eq!(outcome.history_written, 2);
}

#[tokio::test]
async fn test_mail_failure_does_not_block_commit() {
    let (_dir, store) = create_test_store().await;
    let cache = Arc::new(MemoryCache::new());

    // mail provider rejects everything
    let mail_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(500).set_body_string("rate limited"))
        .mount(&mail_server)
        .await;

    let id = store
        .create_monitor(create_test_monitor("https://example.com"))
        .await
        .unwrap();

    let now = Utc::now();
    put_batch(&cache, &[make_result(id, 503, now)]).await;

    let aggregator = Aggregator::new(
        store.clone(),
        cache.clone(),
        test_mailer(&mail_server),
        test_aggregator_config(),
    );
    let outcome = aggregator.run_tick(now).await.unwrap();

    // the send failed, but history and state are committed and the
    // marker still exists (no retry storm on the provider)
    assert_eq!(outcome.alerts_sent, 0);
    assert_eq!(outcome.markers_created, 1);
    assert_eq!(outcome.history_written, 1);
    assert_eq!(
        store.get_monitor(id).await.unwrap().unwrap().status,
        MonitorStatus::Down
    );
}
