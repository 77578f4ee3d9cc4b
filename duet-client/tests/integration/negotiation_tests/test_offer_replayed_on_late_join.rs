use duet_client::{CallConfig, MemoryDirectory, SessionDirectory};
use duet_core::{PeerId, Role, RoomId, RoomOptions, SdpType, SignalKind};
use std::sync::Arc;

use crate::utils::{
    FakeCall, FakeTransportFactory, RecordingSignaling, controller_with, eventually,
    init_tracing, wait_for_state,
};

#[tokio::test]
async fn test_offerer_replays_offer_when_answerer_subscribes_late() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let signaling = RecordingSignaling::new();
    let transports = FakeTransportFactory::connecting();
    let room = RoomId::from("late");
    let (answerer_id, offerer_id) = (PeerId::new(), PeerId::new());

    // The answerer owns the room but is not listening yet.
    directory
        .create_or_join_room(&answerer_id, &RoomOptions::invite(room.clone()))
        .await
        .unwrap();

    let offerer = controller_with(
        &directory,
        Arc::new(signaling.clone()),
        &transports,
        CallConfig::default(),
    );
    let mut offerer_state = offerer.subscribe_state();
    offerer.start(offerer_id).await.unwrap();
    offerer.join_invite(room.clone()).await.unwrap();
    assert_eq!(offerer.snapshot().role, Some(Role::Offerer));

    let first_offer = eventually(|| {
        let signaling = signaling.clone();
        async move { signaling.count_of(&offerer_id, SignalKind::Offer).await == 1 }
    })
    .await;
    assert!(first_offer, "offer published before anyone listens");

    let answerer = controller_with(
        &directory,
        Arc::new(signaling.clone()),
        &transports,
        CallConfig::default(),
    );
    let mut answerer_state = answerer.subscribe_state();
    answerer.start(answerer_id).await.unwrap();
    answerer.join_room(room.clone()).await.unwrap();

    wait_for_state(&mut answerer_state, |s| s.is_connected).await;
    wait_for_state(&mut offerer_state, |s| s.is_connected).await;

    assert_eq!(signaling.count_of(&offerer_id, SignalKind::Offer).await, 2);
    let answerer_transport = transports.last().await.unwrap();
    let remote_offers = answerer_transport
        .calls()
        .await
        .into_iter()
        .filter(|c| *c == FakeCall::SetRemote(SdpType::Offer))
        .count();
    assert_eq!(remote_offers, 1);
}
