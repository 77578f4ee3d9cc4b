mod test_leave_twice;
mod test_lost_subscription;
mod test_room_given_back;
mod test_toggle_media;
mod test_transport_failure;

use duet_client::{CallConfig, CallController, CallSnapshot, MemoryDirectory, SignalingChannel};
use duet_core::PeerId;
use std::sync::Arc;
use tokio::sync::watch;

use crate::utils::{FakeTransportFactory, controller_with, wait_for_state};

pub struct ConnectedPair {
    pub answerer: CallController,
    pub answerer_id: PeerId,
    pub answerer_state: watch::Receiver<CallSnapshot>,
    pub offerer: CallController,
    pub offerer_id: PeerId,
    pub offerer_state: watch::Receiver<CallSnapshot>,
}

/// Matches two fresh participants and waits until both are connected.
pub async fn connect_pair(
    directory: &MemoryDirectory,
    signaling: Arc<dyn SignalingChannel>,
    transports: &FakeTransportFactory,
    answerer_config: CallConfig,
    offerer_config: CallConfig,
) -> ConnectedPair {
    let (answerer_id, offerer_id) = (PeerId::new(), PeerId::new());
    let answerer = controller_with(directory, Arc::clone(&signaling), transports, answerer_config);
    let offerer = controller_with(directory, signaling, transports, offerer_config);
    let mut answerer_state = answerer.subscribe_state();
    let mut offerer_state = offerer.subscribe_state();

    answerer.start(answerer_id).await.expect("answerer media");
    answerer.find_partner().await.expect("answerer room");
    offerer.start(offerer_id).await.expect("offerer media");
    offerer.find_partner().await.expect("offerer room");

    wait_for_state(&mut answerer_state, |s| s.is_connected).await;
    wait_for_state(&mut offerer_state, |s| s.is_connected).await;

    ConnectedPair {
        answerer,
        answerer_id,
        answerer_state,
        offerer,
        offerer_id,
        offerer_state,
    }
}
