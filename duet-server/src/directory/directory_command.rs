use duet_core::{PeerId, RoomAssignment, RoomError, RoomId, RoomOptions, RoomRecord};
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Requests handled by the directory actor, one at a time.
#[derive(Debug)]
pub enum DirectoryCommand {
    FindRoom {
        peer_id: PeerId,
        opts: RoomOptions,
        reply: Reply<RoomAssignment>,
    },

    FetchRoom {
        room_id: RoomId,
        reply: Reply<RoomRecord>,
    },

    LeaveRoom {
        peer_id: PeerId,
        room_id: RoomId,
        reply: Reply<()>,
    },

    /// The peer's socket closed; drop the rooms it was waiting in alone.
    Disconnect { peer_id: PeerId },
}
