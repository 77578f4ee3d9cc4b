use duet_client::{
    CallConfig, CallPhase, MemoryDirectory, PeerLostPolicy, SignalingChannel, TransportEvent,
    TransportState,
};
use duet_core::{IceCandidate, Role, SignalMessage};
use std::sync::Arc;

use super::connect_pair;
use crate::utils::{
    FakeTransportFactory, RecordingSignaling, eventually, init_tracing, settle, wait_for_state,
};

#[tokio::test]
async fn test_failed_transport_ends_the_call() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let signaling = RecordingSignaling::new();
    let transports = FakeTransportFactory::connecting();
    let mut pair = connect_pair(
        &directory,
        Arc::new(signaling.clone()),
        &transports,
        CallConfig::default(),
        CallConfig::default(),
    )
    .await;
    let room = pair.offerer.snapshot().room_id.unwrap();

    let offerer_transport = transports.handles().await[1].clone();
    offerer_transport
        .emit(TransportEvent::StateChanged(TransportState::Failed))
        .await;

    let ended = wait_for_state(&mut pair.offerer_state, |s| s.phase == CallPhase::Ended).await;
    assert!(!ended.is_connected);
    assert!(ended.error.is_none());
    assert!(ended.room_id.is_none());
    assert!(ended.local_stream.is_some());
    assert_eq!(offerer_transport.close_count().await, 1);

    // The other side hears the leave and ends too.
    wait_for_state(&mut pair.answerer_state, |s| s.phase == CallPhase::Ended).await;

    let applied_before = offerer_transport.applied_candidates().await.len();
    signaling
        .bus()
        .publish(
            &room,
            SignalMessage::Candidate {
                data: IceCandidate::new("after-failure"),
                sender: pair.answerer_id,
            },
        )
        .await
        .unwrap();
    settle().await;
    assert_eq!(
        offerer_transport.applied_candidates().await.len(),
        applied_before
    );
}

#[tokio::test]
async fn test_failed_transport_requeues_when_configured() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let signaling = RecordingSignaling::new();
    let transports = FakeTransportFactory::connecting();
    let requeue = CallConfig {
        peer_lost: PeerLostPolicy::Requeue,
        ..Default::default()
    };
    let mut pair = connect_pair(
        &directory,
        Arc::new(signaling.clone()),
        &transports,
        CallConfig::default(),
        requeue,
    )
    .await;
    let old_room = pair.offerer.snapshot().room_id.unwrap();

    let offerer_transport = transports.handles().await[1].clone();
    offerer_transport
        .emit(TransportEvent::StateChanged(TransportState::Failed))
        .await;

    let requeued = wait_for_state(&mut pair.offerer_state, |s| {
        s.phase == CallPhase::Negotiating
            && s.room_id.as_ref().is_some_and(|room| *room != old_room)
    })
    .await;
    // Nobody else is waiting, so the requeued side opens a fresh room.
    assert_eq!(requeued.role, Some(Role::Answerer));
    assert_eq!(offerer_transport.close_count().await, 1);
    assert_eq!(transports.created_count().await, 3);
    let bus = signaling.bus().clone();
    let released = eventually(|| {
        let bus = bus.clone();
        let old_room = old_room.clone();
        async move { bus.subscriber_count(&old_room) == 0 }
    })
    .await;
    assert!(released);
}
