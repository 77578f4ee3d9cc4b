use duet_core::{RelayFrame, RoomError, RoomOptions, RoomSlot};
use std::time::Duration;

use crate::utils::{TestClient, init_tracing, spawn_relay};

#[tokio::test]
async fn test_find_room_pairs_two_peers() {
    init_tracing();
    let addr = spawn_relay().await;

    let mut alice = TestClient::connect(addr).await.unwrap();
    let mut bob = TestClient::connect(addr).await.unwrap();

    let first = alice.find_room(RoomOptions::default()).await.unwrap();
    assert_eq!(first.slot, RoomSlot::A);
    assert!(first.record.slot_b.is_none());

    let second = bob.find_room(RoomOptions::default()).await.unwrap();
    assert_eq!(second.slot, RoomSlot::B);
    assert_eq!(second.record.room_id, first.record.room_id);
    assert_eq!(second.record.slot_a, alice.peer_id);
    assert_eq!(second.record.slot_b, Some(bob.peer_id));
}

#[tokio::test]
async fn test_left_room_is_abandoned() {
    init_tracing();
    let addr = spawn_relay().await;

    let mut alice = TestClient::connect(addr).await.unwrap();
    let assignment = alice.find_room(RoomOptions::default()).await.unwrap();
    let room = assignment.record.room_id;

    let request_id = alice.next_request_id();
    alice
        .send(&RelayFrame::LeaveRoom {
            request_id,
            room: room.clone(),
        })
        .await
        .unwrap();
    assert_eq!(alice.recv().await.unwrap(), RelayFrame::Ack { request_id });

    let request_id = alice.next_request_id();
    alice
        .send(&RelayFrame::FetchRoom {
            request_id,
            room: room.clone(),
        })
        .await
        .unwrap();
    match alice.recv().await.unwrap() {
        RelayFrame::Error {
            request_id: Some(answered),
            error: RoomError::Abandoned(abandoned),
        } => {
            assert_eq!(answered, request_id);
            assert_eq!(abandoned, room);
        }
        other => panic!("expected Abandoned, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_abandons_waiting_room() {
    init_tracing();
    let addr = spawn_relay().await;

    let mut alice = TestClient::connect(addr).await.unwrap();
    alice.find_room(RoomOptions::default()).await.unwrap();
    alice.close().await.unwrap();

    // Give the relay time to hand the disconnect to the directory.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut bob = TestClient::connect(addr).await.unwrap();
    let assignment = bob.find_room(RoomOptions::default()).await.unwrap();
    assert_eq!(assignment.slot, RoomSlot::A);
    assert_eq!(assignment.record.slot_a, bob.peer_id);
}
