mod local_bus;
mod relay_client;

pub use local_bus::LocalBus;
pub use relay_client::{RelayClient, RelayClientConfig};

use crate::error::Result;
use async_trait::async_trait;
use duet_core::{Envelope, RoomId, SignalMessage};
use tokio::sync::mpsc;

/// Returned by [`SignalingChannel::subscribe`]; hand it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    room_id: RoomId,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, room_id: RoomId) -> Self {
        Self { id, room_id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }
}

/// Room-scoped relay for negotiation messages.
///
/// Delivery is at-least-once and may include the publisher's own messages;
/// receivers filter by sender. Kinds are not ordered relative to each other.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn subscribe(
        &self,
        room_id: &RoomId,
        sink: mpsc::UnboundedSender<Envelope>,
    ) -> Result<SubscriptionHandle>;

    async fn publish(&self, room_id: &RoomId, message: SignalMessage) -> Result<()>;

    /// Idempotent, and safe to call after the transport went away.
    async fn unsubscribe(&self, handle: &SubscriptionHandle);
}
