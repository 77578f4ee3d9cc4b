use crate::model::{PeerId, RoomAssignment, RoomError, RoomId, RoomOptions, RoomRecord, RoomSlot};
use std::collections::{HashMap, VecDeque};

struct RoomEntry {
    record: RoomRecord,
    abandoned: bool,
}

/// In-memory matchmaking: pairs strangers into two-slot rooms and tracks
/// invite rooms by name.
///
/// Leaving a room abandons it rather than deleting it, so a late lookup
/// reports `Abandoned` instead of silently handing out a fresh record.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, RoomEntry>,
    /// Random-match rooms with an empty slot B, oldest first.
    waiting: VecDeque<RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_or_join(
        &mut self,
        peer_id: PeerId,
        opts: &RoomOptions,
    ) -> Result<RoomAssignment, RoomError> {
        match &opts.invite {
            Some(room_id) => self.join_invite(peer_id, room_id),
            None => Ok(self.match_random(peer_id)),
        }
    }

    pub fn fetch(&self, room_id: &RoomId) -> Result<RoomRecord, RoomError> {
        match self.rooms.get(room_id) {
            Some(entry) if entry.abandoned => Err(RoomError::Abandoned(room_id.clone())),
            Some(entry) => Ok(entry.record.clone()),
            None => Err(RoomError::NotFound(room_id.clone())),
        }
    }

    /// Abandons the room. Leaving an already abandoned room is a no-op.
    pub fn leave(&mut self, room_id: &RoomId, peer_id: &PeerId) -> Result<(), RoomError> {
        let Some(entry) = self.rooms.get_mut(room_id) else {
            return Err(RoomError::NotFound(room_id.clone()));
        };
        if entry.record.slot_of(peer_id).is_none() {
            return Err(RoomError::BadRequest(format!(
                "peer {} is not a member of room {}",
                peer_id, room_id
            )));
        }
        entry.abandoned = true;
        self.waiting.retain(|id| id != room_id);
        Ok(())
    }

    /// Abandons every matchmaking room `peer_id` is still waiting in alone.
    /// Filled rooms are kept so the pair can rejoin after a reconnect.
    pub fn abandon_waiting(&mut self, peer_id: &PeerId) -> Vec<RoomId> {
        let rooms = &mut self.rooms;
        let mut abandoned = Vec::new();
        self.waiting.retain(|room_id| {
            match rooms.get_mut(room_id) {
                Some(entry) if entry.record.slot_a == *peer_id => {
                    entry.abandoned = true;
                    abandoned.push(room_id.clone());
                    false
                }
                _ => true,
            }
        });
        abandoned
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn join_invite(
        &mut self,
        peer_id: PeerId,
        room_id: &RoomId,
    ) -> Result<RoomAssignment, RoomError> {
        if room_id.as_str().is_empty() {
            return Err(RoomError::BadRequest("empty room id".to_owned()));
        }

        let Some(entry) = self.rooms.get_mut(room_id) else {
            let record = RoomRecord::new(room_id.clone(), peer_id);
            self.rooms.insert(
                room_id.clone(),
                RoomEntry {
                    record: record.clone(),
                    abandoned: false,
                },
            );
            return Ok(RoomAssignment {
                record,
                slot: RoomSlot::A,
            });
        };

        if entry.abandoned {
            return Err(RoomError::Abandoned(room_id.clone()));
        }
        if let Some(slot) = entry.record.slot_of(&peer_id) {
            return Ok(RoomAssignment {
                record: entry.record.clone(),
                slot,
            });
        }
        if entry.record.is_full() {
            return Err(RoomError::Full(room_id.clone()));
        }

        entry.record.slot_b = Some(peer_id);
        let record = entry.record.clone();
        self.waiting.retain(|id| id != room_id);
        Ok(RoomAssignment {
            record,
            slot: RoomSlot::B,
        })
    }

    fn match_random(&mut self, peer_id: PeerId) -> RoomAssignment {
        // A peer that is already waiting keeps its room.
        if let Some(record) = self
            .waiting
            .iter()
            .filter_map(|id| self.rooms.get(id))
            .map(|entry| &entry.record)
            .find(|record| record.slot_a == peer_id)
        {
            return RoomAssignment {
                record: record.clone(),
                slot: RoomSlot::A,
            };
        }

        let partner_room = self.waiting.iter().position(|id| {
            self.rooms
                .get(id)
                .is_some_and(|entry| !entry.abandoned && entry.record.slot_a != peer_id)
        });

        if let Some(index) = partner_room
            && let Some(room_id) = self.waiting.remove(index)
            && let Some(entry) = self.rooms.get_mut(&room_id)
        {
            entry.record.slot_b = Some(peer_id);
            return RoomAssignment {
                record: entry.record.clone(),
                slot: RoomSlot::B,
            };
        }

        let record = RoomRecord::new(RoomId::new(), peer_id);
        self.waiting.push_back(record.room_id.clone());
        self.rooms.insert(
            record.room_id.clone(),
            RoomEntry {
                record: record.clone(),
                abandoned: false,
            },
        );
        RoomAssignment {
            record,
            slot: RoomSlot::A,
        }
    }
}
