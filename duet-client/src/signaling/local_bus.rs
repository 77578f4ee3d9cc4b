use super::{SignalingChannel, SubscriptionHandle};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use duet_core::{Envelope, RoomId, SignalMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

type Subscribers = Vec<(u64, mpsc::UnboundedSender<Envelope>)>;

#[derive(Default)]
struct LocalBusInner {
    rooms: DashMap<RoomId, Subscribers>,
    next_id: AtomicU64,
}

/// In-process pub/sub keyed by room. Publishers hear their own messages.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<LocalBusInner>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.inner
            .rooms
            .get(room_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SignalingChannel for LocalBus {
    async fn subscribe(
        &self,
        room_id: &RoomId,
        sink: mpsc::UnboundedSender<Envelope>,
    ) -> Result<SubscriptionHandle> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .rooms
            .entry(room_id.clone())
            .or_default()
            .push((id, sink));
        debug!("Subscription {} opened on room {}", id, room_id);
        Ok(SubscriptionHandle::new(id, room_id.clone()))
    }

    async fn publish(&self, room_id: &RoomId, message: SignalMessage) -> Result<()> {
        let Some(mut subs) = self.inner.rooms.get_mut(room_id) else {
            trace!("No subscribers on room {}, dropping {}", room_id, message.kind());
            return Ok(());
        };

        subs.retain(|(id, sink)| {
            let envelope = Envelope {
                room_id: room_id.clone(),
                message: message.clone(),
            };
            if sink.send(envelope).is_err() {
                debug!("Subscription {} on room {} went away", id, room_id);
                return false;
            }
            true
        });
        Ok(())
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let room_id = handle.room_id();
        let now_empty = match self.inner.rooms.get_mut(room_id) {
            Some(mut subs) => {
                subs.retain(|(id, _)| *id != handle.id());
                subs.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.inner
                .rooms
                .remove_if(room_id, |_, subs| subs.is_empty());
        }
    }
}
