pub mod candidate_buffer;
pub mod controller;
pub mod directory;
pub mod error;
pub mod media;
pub mod peer_connection;
pub mod signaling;
pub mod transport;

pub use candidate_buffer::CandidateBuffer;
pub use controller::{
    CallConfig, CallController, CallDeps, CallPhase, CallSnapshot, PeerLostPolicy,
};
pub use directory::{MemoryDirectory, SessionDirectory};
pub use error::{CallError, Result};
pub use media::{
    LocalMediaStream, MediaConstraints, MediaSource, MediaTrack, RemoteMediaStream, RemoteTrack,
    SyntheticMedia, TrackKind,
};
pub use peer_connection::{
    CandidateDisposition, NegotiationState, PeerConnectionManager, PeerEvent,
};
pub use signaling::{LocalBus, RelayClient, RelayClientConfig, SignalingChannel, SubscriptionHandle};
pub use transport::{
    PeerTransport, RtcTransport, RtcTransportFactory, TransportConfig, TransportEvent,
    TransportFactory, TransportState,
};
