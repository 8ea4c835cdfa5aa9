//! Integration tests for WebSocket connection, auth close codes, ping/pong,
//! capacity rejection, and registry cleanup on disconnect.

mod common;

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use common::*;
use pulse_hub::config::Config;
use pulse_hub::identity;

#[tokio::test]
async fn connection_with_valid_token_gets_presence_snapshot() {
    let (addr, _state) = spawn_hub(MockPersist::new()).await;

    let (_write, mut read) = connect(addr, "alice").await;

    // The snapshot includes the connecting user themselves.
    let frame = next_frame_of_type(&mut read, "presence_snapshot", Duration::from_secs(2))
        .await
        .expect("expected presence snapshot frame");
    let online = frame["online_users"].as_array().unwrap();
    assert!(online.iter().any(|u| u == "alice"));

    // No further traffic after the snapshot.
    let quiet = next_json(&mut read, Duration::from_millis(300)).await;
    assert!(quiet.is_none(), "expected silence after snapshot, got {:?}", quiet);
}

/// The snapshot arrives complete even when the online population exceeds
/// the per-connection queue depth.
#[tokio::test]
async fn snapshot_is_complete_with_small_queue_depth() {
    let config = Config {
        connection_queue_depth: 2,
        ..Config::default()
    };
    let (addr, _state) = spawn_hub_with_config(MockPersist::new(), config).await;

    let mut held = Vec::new();
    for i in 0..6 {
        let (write, mut read) = connect(addr, &format!("u{}", i)).await;
        drain_frames(&mut read).await;
        held.push((write, read));
    }

    let (_write, mut read) = connect(addr, "observer").await;
    let frame = next_frame_of_type(&mut read, "presence_snapshot", Duration::from_secs(2))
        .await
        .expect("expected presence snapshot frame");
    let online = frame["online_users"].as_array().unwrap();
    for i in 0..6 {
        let user = format!("u{}", i);
        assert!(
            online.iter().any(|u| u == &user),
            "snapshot is missing {}: {:?}",
            user,
            online
        );
    }
    assert!(online.iter().any(|u| u == "observer"));
}

#[tokio::test]
async fn invalid_token_closes_with_4002() {
    let (addr, _state) = spawn_hub(MockPersist::new()).await;

    let ws_url = format!("ws://{}/ws?token=not-a-token", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("WebSocket should upgrade even with invalid token");
    let (mut _write, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("expected close within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(frame.code, CloseCode::from(4002));
        }
        other => panic!("expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn expired_token_closes_with_4001() {
    let (addr, _state) = spawn_hub(MockPersist::new()).await;

    // Expired well past the validator's 60s leeway.
    let token = identity::issue_identity_token(TEST_SECRET, "alice", -300).unwrap();
    let ws_url = format!("ws://{}/ws?token={}", addr, token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let (mut _write, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("expected close within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(frame.code, CloseCode::from(4001));
        }
        other => panic!("expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn client_ping_gets_pong() {
    let (addr, _state) = spawn_hub(MockPersist::new()).await;

    let (mut write, mut read) = connect(addr, "alice").await;
    drain_frames(&mut read).await;

    write
        .send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44]);
        }
        other => panic!("expected pong, got {:?}", other),
    }
}

/// Control frames keep flowing while a submit waits on a slow store, so
/// liveness checks cannot be starved by persistence latency.
#[tokio::test]
async fn ping_answered_while_submit_in_flight() {
    let persist = MockPersist::new();
    persist.set_delay(Duration::from_millis(800));
    let (addr, _state) = spawn_hub(persist.clone()).await;

    let (mut write, mut read) = connect(addr, "alice").await;
    drain_frames(&mut read).await;

    write
        .send(submit_envelope("req-1", "bob", "hi"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    write
        .send(Message::Ping(vec![7].into()))
        .await
        .unwrap();

    // The pong must arrive while the store is still sleeping, before the
    // submit ack.
    let pong_first = tokio::time::timeout(Duration::from_millis(400), async {
        loop {
            match read.next().await {
                Some(Ok(Message::Pong(_))) => return true,
                Some(Ok(Message::Text(_))) => return false,
                Some(Ok(_)) => continue,
                _ => return false,
            }
        }
    })
    .await
    .expect("expected a pong while the submit was in flight");
    assert!(pong_first, "submit ack arrived before the pong");

    // The submit still completes normally afterwards.
    let ack = next_frame_of_type(&mut read, "submit_ack", Duration::from_secs(2))
        .await
        .expect("expected submit ack");
    assert_eq!(ack["request_id"], "req-1");
}

#[tokio::test]
async fn admission_beyond_capacity_is_rejected() {
    let config = Config {
        max_connections: 1,
        ..Config::default()
    };
    let (addr, state) = spawn_hub_with_config(MockPersist::new(), config).await;

    let (_w1, mut r1) = connect(addr, "alice").await;
    drain_frames(&mut r1).await;
    assert_eq!(state.registry.total_connections(), 1);

    // Second connection is admitted at the transport level but closed with
    // 1013 (try again later).
    let ws_url = format!("ws://{}/ws?token={}", addr, token_for("bob"));
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let (mut _w2, mut r2) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), r2.next())
        .await
        .expect("expected close within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(frame.code, CloseCode::from(1013));
        }
        other => panic!("expected capacity close frame, got {:?}", other),
    }
    assert!(!state.registry.is_online("bob"));
}

#[tokio::test]
async fn disconnect_cleans_up_registry() {
    let (addr, state) = spawn_hub(MockPersist::new()).await;

    {
        let (mut write, mut read) = connect(addr, "alice").await;
        drain_frames(&mut read).await;
        assert!(state.registry.is_online("alice"));

        write.send(Message::Close(None)).await.unwrap();
    }

    // Give the actor a moment to unwind.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!state.registry.is_online("alice"));
    assert_eq!(state.registry.total_connections(), 0);

    // Reconnect works fine after cleanup.
    let (_write, mut read) = connect(addr, "alice").await;
    let frame = next_frame_of_type(&mut read, "presence_snapshot", Duration::from_secs(2)).await;
    assert!(frame.is_some(), "expected snapshot after reconnect");
}
