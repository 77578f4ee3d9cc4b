use crate::media::RemoteTrack;
use duet_core::IceCandidate;

/// Connection state reported by the platform transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    /// States that end the attempt; the path is never retried.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransportState::Disconnected | TransportState::Failed | TransportState::Closed
        )
    }
}

/// Callbacks of one transport, funnelled into the attempt's event queue.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local candidate was gathered and must be sent to the remote side.
    CandidateGenerated(IceCandidate),

    /// A remote media track arrived.
    RemoteTrack(RemoteTrack),

    StateChanged(TransportState),
}
