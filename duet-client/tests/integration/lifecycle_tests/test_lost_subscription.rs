use duet_client::{CallConfig, CallError, CallPhase, MemoryDirectory};
use duet_core::PeerId;
use std::sync::Arc;

use crate::utils::{
    DroppingSignaling, FakeTransportFactory, controller_with, init_tracing, wait_for_state,
};

#[tokio::test]
async fn test_lost_subscription_fails_the_attempt() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let transports = FakeTransportFactory::connecting();
    let controller = controller_with(
        &directory,
        Arc::new(DroppingSignaling::default()),
        &transports,
        CallConfig::default(),
    );
    let mut state = controller.subscribe_state();

    controller.start(PeerId::new()).await.unwrap();
    controller.find_partner().await.unwrap();

    let failed = wait_for_state(&mut state, |s| s.phase.is_failed()).await;
    assert!(matches!(
        failed.error,
        Some(CallError::SignalingUnavailable(_))
    ));
    assert_eq!(transports.handles().await[0].close_count().await, 1);
    assert_eq!(directory.registry().lock().await.waiting_len(), 0);
}
