use duet_client::{
    CallConfig, CallController, CallDeps, CallError, CallPhase, MemoryDirectory, SyntheticMedia,
};
use duet_core::{PeerId, Role};
use std::sync::Arc;

use crate::utils::{
    FakeScript, FakeTransportFactory, GatedDirectory, RecordingSignaling, controller_with,
    init_tracing, wait_for_state,
};

#[tokio::test]
async fn test_failed_transport_setup_frees_the_room() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let signaling = RecordingSignaling::new();
    let broken = FakeTransportFactory::new(FakeScript {
        fail_create: true,
        ..Default::default()
    });
    let working = FakeTransportFactory::connecting();

    let first = controller_with(
        &directory,
        Arc::new(signaling.clone()),
        &broken,
        CallConfig::default(),
    );
    first.start(PeerId::new()).await.unwrap();
    let err = first.find_partner().await.unwrap_err();
    assert!(matches!(err, CallError::Negotiation(_)));
    assert!(first.snapshot().phase.is_failed());
    assert_eq!(directory.registry().lock().await.waiting_len(), 0);

    // The next stranger opens a fresh room instead of joining the dead one.
    let second = controller_with(
        &directory,
        Arc::new(signaling.clone()),
        &working,
        CallConfig::default(),
    );
    let mut second_state = second.subscribe_state();
    second.start(PeerId::new()).await.unwrap();
    second.find_partner().await.unwrap();

    let snapshot = wait_for_state(&mut second_state, |s| s.phase == CallPhase::Negotiating).await;
    assert_eq!(snapshot.role, Some(Role::Answerer));
    assert_eq!(directory.registry().lock().await.waiting_len(), 1);
}

#[tokio::test]
async fn test_leave_during_matchmaking_frees_the_room() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let gated = GatedDirectory::new(directory.clone());
    let signaling = RecordingSignaling::new();
    let transports = FakeTransportFactory::connecting();
    let controller = CallController::new(
        CallDeps {
            media: Arc::new(SyntheticMedia),
            directory: Arc::new(gated.clone()),
            signaling: Arc::new(signaling.clone()),
            transports: Arc::new(transports.clone()),
        },
        CallConfig::default(),
    );
    controller.start(PeerId::new()).await.unwrap();

    let matching = tokio::spawn({
        let controller = controller.clone();
        async move { controller.find_partner().await }
    });
    gated.entered().await;
    assert_eq!(directory.registry().lock().await.waiting_len(), 1);

    controller.leave().await.unwrap();
    gated.release();
    matching.await.unwrap().unwrap();

    assert_eq!(controller.snapshot().phase, CallPhase::Ended);
    assert_eq!(directory.registry().lock().await.waiting_len(), 0);
    assert_eq!(transports.created_count().await, 0);
    assert!(signaling.published().await.is_empty());
}
