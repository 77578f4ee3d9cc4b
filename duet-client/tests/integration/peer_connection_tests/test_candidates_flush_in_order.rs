use duet_client::{CandidateDisposition, NegotiationState};
use duet_core::{IceCandidate, Role, SdpType, SessionDescription};

use super::open_manager;
use crate::utils::{FakeCall, FakeScript, init_tracing};

#[tokio::test]
async fn test_early_candidates_apply_after_offer_in_order() {
    init_tracing();

    let mut opened = open_manager(Role::Answerer, FakeScript::default()).await;
    let manager = &mut opened.manager;

    for name in ["c1", "c2", "c3"] {
        let disposition = manager
            .add_remote_candidate(IceCandidate::new(name))
            .await
            .unwrap();
        assert_eq!(disposition, CandidateDisposition::Deferred);
    }
    assert_eq!(manager.buffered_candidates(), 3);
    assert!(opened.handle.applied_candidates().await.is_empty());

    let answer = manager
        .apply_remote_offer_and_answer(SessionDescription::offer("v=0 remote"))
        .await
        .unwrap();
    assert_eq!(answer.kind, SdpType::Answer);
    assert_eq!(manager.state(), NegotiationState::HaveRemoteOffer);
    assert_eq!(manager.buffered_candidates(), 0);
    assert_eq!(manager.applied_candidates(), 3);

    let calls = opened.handle.calls().await;
    let negotiation: Vec<_> = calls
        .into_iter()
        .filter(|call| !matches!(call, FakeCall::AddTrack(_)))
        .collect();
    assert_eq!(
        negotiation,
        vec![
            FakeCall::SetRemote(SdpType::Offer),
            FakeCall::AddCandidate("c1".to_string()),
            FakeCall::AddCandidate("c2".to_string()),
            FakeCall::AddCandidate("c3".to_string()),
            FakeCall::CreateAnswer,
            FakeCall::SetLocal(SdpType::Answer),
        ]
    );
}

#[tokio::test]
async fn test_candidates_after_flush_apply_immediately() {
    init_tracing();

    let mut opened = open_manager(Role::Offerer, FakeScript::default()).await;
    let manager = &mut opened.manager;

    manager.create_offer_and_set_local().await.unwrap();
    manager
        .add_remote_candidate(IceCandidate::new("early"))
        .await
        .unwrap();
    manager
        .apply_remote_answer(SessionDescription::answer("v=0 remote"))
        .await
        .unwrap();

    let disposition = manager
        .add_remote_candidate(IceCandidate::new("late"))
        .await
        .unwrap();
    assert_eq!(disposition, CandidateDisposition::Applied);
    assert_eq!(manager.buffered_candidates(), 0);
    assert_eq!(
        opened.handle.applied_candidates().await,
        vec!["early".to_string(), "late".to_string()]
    );
}
