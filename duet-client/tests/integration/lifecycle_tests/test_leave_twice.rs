use duet_client::{CallConfig, CallError, CallPhase, MemoryDirectory, SessionDirectory};
use duet_core::{PeerId, RoleConflict, RoomError, SignalKind};
use std::sync::Arc;

use crate::utils::{FakeTransportFactory, RecordingSignaling, controller_with, init_tracing};

#[tokio::test]
async fn test_leave_twice_releases_once() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let signaling = RecordingSignaling::new();
    let transports = FakeTransportFactory::connecting();
    let user_id = PeerId::new();
    let controller = controller_with(
        &directory,
        Arc::new(signaling.clone()),
        &transports,
        CallConfig::default(),
    );

    controller.start(user_id).await.unwrap();
    controller.find_partner().await.unwrap();
    let waiting = controller.snapshot();
    let room = waiting.room_id.clone().expect("waiting in a room");
    let local = waiting.local_stream.clone().expect("local media");
    assert_eq!(waiting.phase, CallPhase::Negotiating);

    controller.leave().await.unwrap();
    controller.leave().await.unwrap();

    let handle = transports.last().await.unwrap();
    assert_eq!(handle.close_count().await, 1);
    assert_eq!(signaling.count_of(&user_id, SignalKind::Leave).await, 1);
    assert!(local.is_stopped());
    assert_eq!(signaling.bus().subscriber_count(&room), 0);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Ended);
    assert!(snapshot.local_stream.is_none());
    assert!(!snapshot.is_connected);

    let err = directory.fetch_room(&room).await.unwrap_err();
    assert_eq!(
        err,
        CallError::RoleConflict(RoleConflict::Unavailable(RoomError::Abandoned(room)))
    );
}

#[tokio::test]
async fn test_leave_before_start_is_harmless() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let signaling = RecordingSignaling::new();
    let transports = FakeTransportFactory::connecting();
    let controller = controller_with(
        &directory,
        Arc::new(signaling.clone()),
        &transports,
        CallConfig::default(),
    );

    controller.leave().await.unwrap();
    controller.leave().await.unwrap();

    assert_eq!(controller.snapshot().phase, CallPhase::Ended);
    assert!(signaling.published().await.is_empty());
}
