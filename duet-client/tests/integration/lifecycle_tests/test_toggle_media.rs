use duet_client::{CallConfig, MemoryDirectory, TrackKind};
use duet_core::PeerId;
use std::sync::Arc;

use crate::utils::{FakeTransportFactory, RecordingSignaling, controller_with, init_tracing};

#[tokio::test]
async fn test_toggles_flip_local_tracks_only() {
    init_tracing();

    let directory = MemoryDirectory::new();
    let transports = FakeTransportFactory::connecting();
    let controller = controller_with(
        &directory,
        Arc::new(RecordingSignaling::new()),
        &transports,
        CallConfig::default(),
    );

    assert_eq!(controller.toggle_audio(false).await, 0);

    controller.start(PeerId::new()).await.unwrap();
    assert_eq!(controller.toggle_audio(false).await, 1);

    let snapshot = controller.snapshot();
    assert!(!snapshot.audio_enabled);
    assert!(snapshot.video_enabled);
    let local = snapshot.local_stream.unwrap();
    assert!(local.tracks_of(TrackKind::Audio).all(|t| !t.is_enabled()));
    assert!(local.tracks_of(TrackKind::Video).all(|t| t.is_enabled()));

    assert_eq!(controller.toggle_video(false).await, 1);
    assert_eq!(controller.toggle_audio(true).await, 1);
    let snapshot = controller.snapshot();
    assert!(snapshot.audio_enabled);
    assert!(!snapshot.video_enabled);

    // Muting never renegotiates.
    assert_eq!(transports.created_count().await, 0);
}
