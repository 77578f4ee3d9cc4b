use duet_client::{CallConfig, CallPhase, MemoryDirectory, SessionDirectory, SignalingChannel};
use duet_core::{
    IceCandidate, PeerId, Role, RoomId, RoomOptions, SdpType, SessionDescription, SignalKind,
    SignalMessage,
};
use std::sync::Arc;

use crate::utils::{
    FakeCall, FakeTransportFactory, RecordingSignaling, controller_with, init_tracing, settle,
    wait_for_state,
};

#[tokio::test]
async fn test_answerer_applies_early_candidates_and_ignores_echo() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let signaling = RecordingSignaling::new();
    let transports = FakeTransportFactory::connecting();
    let room = RoomId::from("r1");
    let answerer_id = PeerId::new();
    let offerer_id = PeerId::new();

    directory
        .create_or_join_room(&answerer_id, &RoomOptions::invite("r1"))
        .await
        .unwrap();
    directory
        .create_or_join_room(&offerer_id, &RoomOptions::invite("r1"))
        .await
        .unwrap();

    let answerer = controller_with(
        &directory,
        Arc::new(signaling.clone()),
        &transports,
        CallConfig::default(),
    );
    let mut state = answerer.subscribe_state();
    answerer.start(answerer_id).await.unwrap();
    answerer.join_room(room.clone()).await.unwrap();

    let snapshot = answerer.snapshot();
    assert_eq!(snapshot.role, Some(Role::Answerer));
    assert_eq!(snapshot.phase, CallPhase::Negotiating);

    // The offerer's side, played by hand: two candidates overtake the offer.
    let bus = signaling.bus();
    for name in ["remote-1", "remote-2"] {
        bus.publish(
            &room,
            SignalMessage::Candidate {
                data: IceCandidate::new(name),
                sender: offerer_id,
            },
        )
        .await
        .unwrap();
    }
    bus.publish(
        &room,
        SignalMessage::Offer {
            data: SessionDescription::offer("v=0 from offerer"),
            sender: offerer_id,
        },
    )
    .await
    .unwrap();
    bus.publish(
        &room,
        SignalMessage::Candidate {
            data: IceCandidate::new("echoed"),
            sender: answerer_id,
        },
    )
    .await
    .unwrap();

    let connected = wait_for_state(&mut state, |s| s.phase == CallPhase::Connected).await;
    assert!(connected.is_connected);
    assert!(connected.error.is_none());
    assert!(connected.remote_stream.is_some_and(|s| !s.is_empty()));
    settle().await;

    let handle = transports.last().await.unwrap();
    let calls = handle.calls().await;
    let offer_at = calls
        .iter()
        .position(|c| *c == FakeCall::SetRemote(SdpType::Offer))
        .expect("offer applied");
    let first_at = calls
        .iter()
        .position(|c| *c == FakeCall::AddCandidate("remote-1".to_string()))
        .expect("first candidate applied");
    let second_at = calls
        .iter()
        .position(|c| *c == FakeCall::AddCandidate("remote-2".to_string()))
        .expect("second candidate applied");
    assert!(offer_at < first_at && first_at < second_at);

    assert_eq!(
        handle.applied_candidates().await,
        vec!["remote-1".to_string(), "remote-2".to_string()]
    );
    assert_eq!(signaling.count_of(&answerer_id, SignalKind::Answer).await, 1);
    assert_eq!(signaling.count_of(&answerer_id, SignalKind::Offer).await, 0);
}
