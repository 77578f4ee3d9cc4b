use crate::error::Result;
use async_trait::async_trait;
use duet_core::{PeerId, RoomAssignment, RoomId, RoomOptions, RoomRecord, RoomRegistry};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// The collaborator that pairs participants into rooms.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn create_or_join_room(
        &self,
        self_id: &PeerId,
        opts: &RoomOptions,
    ) -> Result<RoomAssignment>;

    async fn fetch_room(&self, room_id: &RoomId) -> Result<RoomRecord>;

    async fn leave_room(&self, self_id: &PeerId, room_id: &RoomId) -> Result<()>;

    /// Both participants reached a live connection. Whatever the directory
    /// wants to allow from here on (friend requests, history) is its call.
    async fn peer_connected(&self, _record: &RoomRecord, _self_id: &PeerId) {}
}

/// Directory over a shared in-process [`RoomRegistry`].
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    registry: Arc<Mutex<RoomRegistry>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Arc<Mutex<RoomRegistry>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> Arc<Mutex<RoomRegistry>> {
        Arc::clone(&self.registry)
    }
}

#[async_trait]
impl SessionDirectory for MemoryDirectory {
    async fn create_or_join_room(
        &self,
        self_id: &PeerId,
        opts: &RoomOptions,
    ) -> Result<RoomAssignment> {
        let assignment = self.registry.lock().await.create_or_join(*self_id, opts)?;
        info!(
            "Peer {} assigned to room {} (slot {:?})",
            self_id, assignment.record.room_id, assignment.slot
        );
        Ok(assignment)
    }

    async fn fetch_room(&self, room_id: &RoomId) -> Result<RoomRecord> {
        Ok(self.registry.lock().await.fetch(room_id)?)
    }

    async fn leave_room(&self, self_id: &PeerId, room_id: &RoomId) -> Result<()> {
        self.registry.lock().await.leave(room_id, self_id)?;
        info!("Peer {} left room {}", self_id, room_id);
        Ok(())
    }
}
