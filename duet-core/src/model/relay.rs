use crate::model::error::RoomError;
use crate::model::peer::PeerId;
use crate::model::room::{RoomAssignment, RoomId, RoomOptions, RoomRecord};
use crate::model::signaling::{IceServerConfig, SignalMessage};
use serde::{Deserialize, Serialize};

pub type RequestId = u64;

/// Frames spoken on the relay WebSocket.
///
/// Client requests that expect a reply carry a `request_id`; the server
/// answers with `Ack`, `Room`/`Assigned`, or `Error` for the same id.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "op", content = "d")]
pub enum RelayFrame {
    Subscribe {
        request_id: RequestId,
        room: RoomId,
    },
    Unsubscribe {
        room: RoomId,
    },
    Publish {
        room: RoomId,
        message: SignalMessage,
    },
    FindRoom {
        request_id: RequestId,
        opts: RoomOptions,
    },
    FetchRoom {
        request_id: RequestId,
        room: RoomId,
    },
    LeaveRoom {
        request_id: RequestId,
        room: RoomId,
    },

    Welcome {
        peer_id: PeerId,
        ice_servers: Vec<IceServerConfig>,
    },
    Deliver {
        room: RoomId,
        message: SignalMessage,
    },
    Assigned {
        request_id: RequestId,
        assignment: RoomAssignment,
    },
    Room {
        request_id: RequestId,
        record: RoomRecord,
    },
    Ack {
        request_id: RequestId,
    },
    Error {
        request_id: Option<RequestId>,
        error: RoomError,
    },
}
