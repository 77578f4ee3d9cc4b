use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which of the two participant slots a peer occupies.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RoomSlot {
    /// The creator of the room record.
    A,
    /// The participant who joined an existing record.
    B,
}

/// Pairing of two participants for one call attempt.
///
/// `slot_a` always holds the creator. `slot_b` stays empty until a second
/// participant is matched or accepts the invite.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct RoomRecord {
    pub room_id: RoomId,
    pub slot_a: PeerId,
    pub slot_b: Option<PeerId>,
    pub created_at: SystemTime,
}

impl RoomRecord {
    pub fn new(room_id: RoomId, creator: PeerId) -> Self {
        Self {
            room_id,
            slot_a: creator,
            slot_b: None,
            created_at: SystemTime::now(),
        }
    }

    pub fn slot_of(&self, peer_id: &PeerId) -> Option<RoomSlot> {
        if &self.slot_a == peer_id {
            Some(RoomSlot::A)
        } else if self.slot_b.as_ref() == Some(peer_id) {
            Some(RoomSlot::B)
        } else {
            None
        }
    }

    /// The participant opposite to `peer_id`, if both slots are filled.
    pub fn partner_of(&self, peer_id: &PeerId) -> Option<PeerId> {
        match self.slot_of(peer_id)? {
            RoomSlot::A => self.slot_b,
            RoomSlot::B => Some(self.slot_a),
        }
    }

    pub fn is_full(&self) -> bool {
        self.slot_b.is_some()
    }
}

/// Matchmaking options for `create_or_join`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, Eq, PartialEq)]
pub struct RoomOptions {
    /// Join (or create) this exact room instead of matching with a stranger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite: Option<RoomId>,
}

impl RoomOptions {
    pub fn invite(room_id: impl Into<RoomId>) -> Self {
        Self {
            invite: Some(room_id.into()),
        }
    }
}

/// Result of a directory lookup: the record and the caller's slot in it.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct RoomAssignment {
    pub record: RoomRecord,
    pub slot: RoomSlot,
}
