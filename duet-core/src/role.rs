use crate::model::{PeerId, RoomError, RoomId, RoomRecord, RoomSlot};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Negotiation role of a participant, fixed for the lifetime of a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Offerer,
    Answerer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Offerer => f.write_str("offerer"),
            Role::Answerer => f.write_str("answerer"),
        }
    }
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RoleConflict {
    #[error("peer {peer} holds no slot in room {room}")]
    NotAMember { room: RoomId, peer: PeerId },

    #[error("room {0} lists the same peer in both slots")]
    DuplicateSlot(RoomId),

    /// The directory could not hand out a usable record for the room.
    #[error("room record unavailable: {0}")]
    Unavailable(#[from] RoomError),
}

/// Derives the caller's role from the room record alone.
///
/// The creator (slot A) answers and the joiner (slot B) offers, so both sides
/// reach the same pairing without talking to each other.
pub fn assign_role(self_id: &PeerId, record: &RoomRecord) -> Result<Role, RoleConflict> {
    if record.slot_b.as_ref() == Some(&record.slot_a) {
        return Err(RoleConflict::DuplicateSlot(record.room_id.clone()));
    }

    match record.slot_of(self_id) {
        Some(RoomSlot::A) => Ok(Role::Answerer),
        Some(RoomSlot::B) => Ok(Role::Offerer),
        None => Err(RoleConflict::NotAMember {
            room: record.room_id.clone(),
            peer: *self_id,
        }),
    }
}
