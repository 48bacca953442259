//! Tests for `WsManager`, exercised directly without HTTP upgrades.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use catalog_api::ws::{Heartbeat, WsManager};

// ---------------------------------------------------------------------------
// Test: add() and remove() track the connection count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();
    assert_eq!(manager.connection_count().await, 0);

    let _rx1 = manager.add("conn-1".to_string(), 7).await;
    let _rx2 = manager.add("conn-2".to_string(), 7).await;
    assert_eq!(manager.connection_count().await, 2);

    manager.remove("conn-1").await;
    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: remove() with unknown ID is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remove_unknown_id_is_noop() {
    let manager = WsManager::new();

    let _rx = manager.add("conn-1".to_string(), 1).await;
    manager.remove("nonexistent").await;

    assert_eq!(manager.connection_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: watchers_of() counts connections per job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn watchers_are_counted_per_job() {
    let manager = WsManager::new();

    let _a = manager.add("a".to_string(), 1).await;
    let _b = manager.add("b".to_string(), 1).await;
    let _c = manager.add("c".to_string(), 2).await;

    assert_eq!(manager.watchers_of(1).await, 2);
    assert_eq!(manager.watchers_of(2).await, 1);
    assert_eq!(manager.watchers_of(3).await, 0);
}

// ---------------------------------------------------------------------------
// Test: ping_all() reaches every connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_reaches_every_connection() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string(), 1).await;
    let mut rx2 = manager.add("conn-2".to_string(), 2).await;

    assert_eq!(manager.ping_all().await, 2);

    assert!(matches!(rx1.try_recv(), Ok(Message::Ping(_))));
    assert!(matches!(rx2.try_recv(), Ok(Message::Ping(_))));
}

// ---------------------------------------------------------------------------
// Test: shutdown_all() sends Close and clears all connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();

    let mut rx1 = manager.add("conn-1".to_string(), 1).await;
    let mut rx2 = manager.add("conn-2".to_string(), 1).await;

    manager.shutdown_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert!(matches!(rx1.recv().await, Some(Message::Close(None))));
    assert!(matches!(rx2.recv().await, Some(Message::Close(None))));
    // Senders were dropped with the map.
    assert!(rx1.recv().await.is_none());
}

// ---------------------------------------------------------------------------
// Test: the heartbeat pings on its interval and stops on request
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_pings_until_stopped() {
    let manager = Arc::new(WsManager::new());
    let mut rx = manager.add("conn-1".to_string(), 1).await;

    let heartbeat = Heartbeat::spawn(Arc::clone(&manager), Duration::from_millis(10));
    assert!(rx.try_recv().is_err(), "first ping waits one interval");

    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("heartbeat should ping")
        .unwrap();
    assert!(matches!(frame, Message::Ping(_)));

    tokio::time::timeout(Duration::from_secs(1), heartbeat.stop())
        .await
        .expect("heartbeat should stop promptly");
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn ping_all_skips_closed_connections() {
    let manager = WsManager::new();
    let _open = manager.add("open".to_string(), 1).await;
    drop(manager.add("gone".to_string(), 1).await);

    assert_eq!(manager.ping_all().await, 1);
}
