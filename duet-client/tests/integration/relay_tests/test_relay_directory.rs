use duet_client::{CallError, SessionDirectory};
use duet_core::{PeerId, RoleConflict, RoomError, RoomOptions, RoomSlot};

use crate::utils::{connect_relay, init_tracing, spawn_relay};

#[tokio::test]
async fn test_relay_pairs_two_clients() {
    init_tracing();
    let addr = spawn_relay().await;
    let (alice, alice_id) = connect_relay(addr).await;
    let (bob, bob_id) = connect_relay(addr).await;

    assert!(!alice.ice_servers().is_empty());

    let created = alice
        .create_or_join_room(&alice_id, &RoomOptions::default())
        .await
        .unwrap();
    let joined = bob
        .create_or_join_room(&bob_id, &RoomOptions::default())
        .await
        .unwrap();

    assert_eq!(created.slot, RoomSlot::A);
    assert_eq!(joined.slot, RoomSlot::B);
    assert_eq!(joined.record.room_id, created.record.room_id);

    let fetched = alice.fetch_room(&created.record.room_id).await.unwrap();
    assert_eq!(fetched.slot_b, Some(bob_id));
}

#[tokio::test]
async fn test_relay_reports_abandoned_room() {
    init_tracing();
    let addr = spawn_relay().await;
    let (alice, alice_id) = connect_relay(addr).await;

    let room = alice
        .create_or_join_room(&alice_id, &RoomOptions::invite("book-club"))
        .await
        .unwrap()
        .record
        .room_id;
    alice.leave_room(&alice_id, &room).await.unwrap();

    let err = alice.fetch_room(&room).await.unwrap_err();
    assert_eq!(
        err,
        CallError::RoleConflict(RoleConflict::Unavailable(RoomError::Abandoned(room)))
    );
}

#[tokio::test]
async fn test_relay_refuses_foreign_identity() {
    init_tracing();
    let addr = spawn_relay().await;
    let (alice, _) = connect_relay(addr).await;

    let err = alice
        .create_or_join_room(&PeerId::new(), &RoomOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::SignalingUnavailable(_)));
}
