//! Unit tests for `WsManager`.
//!
//! These tests exercise the WebSocket connection manager directly, without
//! performing any HTTP upgrades.

use axum::extract::ws::Message;
use autocrm_api::ws::WsManager;
use autocrm_core::roles::Role;

// ---------------------------------------------------------------------------
// Test: add() and remove() track the connection count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_and_remove_track_connection_count() {
    let manager = WsManager::new();
    assert_eq!(manager.connection_count().await, 0);

    let _rx = manager.add("conn-1".to_string(), 1, Role::Agent).await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("nonexistent").await;
    assert_eq!(manager.connection_count().await, 1);

    manager.remove("conn-1").await;
    assert_eq!(manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: sender() reaches the connection's channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sender_delivers_to_the_registered_receiver() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn-1".to_string(), 1, Role::Customer).await;

    let sender = manager.sender("conn-1").await.expect("connection is registered");
    sender.send(Message::Text("hello".into())).unwrap();

    match rx.recv().await {
        Some(Message::Text(text)) => assert_eq!(text.as_str(), "hello"),
        other => panic!("unexpected message: {other:?}"),
    }
    assert!(manager.sender("conn-2").await.is_none());
}

// ---------------------------------------------------------------------------
// Test: get_by_user() finds every connection of a profile
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_by_user_lists_all_connections_of_a_profile() {
    let manager = WsManager::new();
    let _a = manager.add("a".to_string(), 7, Role::Agent).await;
    let _b = manager.add("b".to_string(), 7, Role::Agent).await;
    let _c = manager.add("c".to_string(), 8, Role::Customer).await;

    let mut ids = manager.get_by_user(7).await;
    ids.sort();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
}

// ---------------------------------------------------------------------------
// Test: ping_all() and shutdown_all()
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_all_sends_ping_frames() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn-1".to_string(), 1, Role::Agent).await;

    manager.ping_all().await;

    assert!(matches!(rx.recv().await, Some(Message::Ping(_))));
}

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let manager = WsManager::new();
    let mut rx1 = manager.add("conn-1".to_string(), 1, Role::Agent).await;
    let mut rx2 = manager.add("conn-2".to_string(), 2, Role::Customer).await;

    manager.shutdown_all().await;

    assert!(matches!(rx1.recv().await, Some(Message::Close(None))));
    assert!(matches!(rx2.recv().await, Some(Message::Close(None))));
    assert_eq!(manager.connection_count().await, 0);
}
