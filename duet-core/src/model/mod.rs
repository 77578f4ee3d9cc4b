mod error;
mod peer;
mod relay;
mod room;
mod signaling;

pub use error::RoomError;
pub use peer::PeerId;
pub use relay::{RelayFrame, RequestId};
pub use room::{RoomAssignment, RoomId, RoomOptions, RoomRecord, RoomSlot};
pub use signaling::{
    Envelope, IceCandidate, IceServerConfig, SdpType, SessionDescription, SignalKind,
    SignalMessage,
};
