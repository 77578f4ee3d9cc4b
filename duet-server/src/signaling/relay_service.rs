use crate::directory::DirectoryHandle;
use axum::extract::ws::Message;
use dashmap::DashMap;
use duet_core::{IceServerConfig, PeerId, RelayFrame, RoomError, RoomId, SignalMessage};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Distinct peers a room may hold at once.
pub const ROOM_CAPACITY: usize = 2;

struct RelayInner {
    peers: DashMap<PeerId, mpsc::UnboundedSender<Message>>,
    rooms: DashMap<RoomId, HashSet<PeerId>>,
    subscriptions: DashMap<PeerId, HashSet<RoomId>>,
    ice_servers: Vec<IceServerConfig>,
}

/// Room-scoped fan-out between connected peers, plus the front door of the
/// matchmaking directory.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
    directory: DirectoryHandle,
}

impl RelayService {
    pub fn new(directory: DirectoryHandle, ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                peers: DashMap::new(),
                rooms: DashMap::new(),
                subscriptions: DashMap::new(),
                ice_servers,
            }),
            directory,
        }
    }

    pub fn get_ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    /// Registers the socket of `peer_id`, replacing an older one.
    pub fn add_peer(&self, peer_id: PeerId, tx: mpsc::UnboundedSender<Message>) {
        if self.inner.peers.insert(peer_id, tx).is_some() {
            warn!("Peer {} reconnected, replacing previous socket", peer_id);
        }
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.inner.peers.contains_key(peer_id)
    }

    pub fn subscribers(&self, room_id: &RoomId) -> usize {
        self.inner
            .rooms
            .get(room_id)
            .map(|peers| peers.len())
            .unwrap_or(0)
    }

    pub fn send_frame(&self, peer_id: &PeerId, frame: &RelayFrame) {
        let Some(peer) = self.inner.peers.get(peer_id) else {
            warn!("Attempted to send frame to disconnected peer {}", peer_id);
            return;
        };
        match serde_json::to_string(frame) {
            Ok(json) => {
                if let Err(e) = peer.send(Message::Text(json.into())) {
                    error!("Failed to send WS message to {}: {}", peer_id, e);
                }
            }
            Err(e) => error!("Failed to serialize relay frame: {}", e),
        }
    }

    pub fn subscribe(&self, peer_id: PeerId, room_id: &RoomId) -> Result<(), RoomError> {
        {
            let mut members = self.inner.rooms.entry(room_id.clone()).or_default();
            if !members.contains(&peer_id) && members.len() >= ROOM_CAPACITY {
                return Err(RoomError::Full(room_id.clone()));
            }
            members.insert(peer_id);
        }
        self.inner
            .subscriptions
            .entry(peer_id)
            .or_default()
            .insert(room_id.clone());
        debug!("Peer {} subscribed to room {}", peer_id, room_id);
        Ok(())
    }

    pub fn unsubscribe(&self, peer_id: &PeerId, room_id: &RoomId) {
        if let Some(mut members) = self.inner.rooms.get_mut(room_id) {
            members.remove(peer_id);
        }
        self.inner.rooms.remove_if(room_id, |_, members| members.is_empty());
        if let Some(mut rooms) = self.inner.subscriptions.get_mut(peer_id) {
            rooms.remove(room_id);
        }
    }

    /// Delivers `message` to every subscriber of the room, the publisher
    /// included.
    pub fn publish(
        &self,
        peer_id: &PeerId,
        room_id: &RoomId,
        message: SignalMessage,
    ) -> Result<(), RoomError> {
        if !message.is_from(peer_id) {
            return Err(RoomError::BadRequest(format!(
                "{} may not publish on behalf of {}",
                peer_id,
                message.sender()
            )));
        }

        let members: Vec<PeerId> = match self.inner.rooms.get(room_id) {
            Some(members) if members.contains(peer_id) => members.iter().copied().collect(),
            _ => {
                return Err(RoomError::BadRequest(format!(
                    "not subscribed to room {}",
                    room_id
                )));
            }
        };

        let frame = RelayFrame::Deliver {
            room: room_id.clone(),
            message,
        };
        for member in &members {
            self.send_frame(member, &frame);
        }
        Ok(())
    }

    /// Applies one client frame.
    pub async fn handle_frame(&self, peer_id: PeerId, frame: RelayFrame) {
        match frame {
            RelayFrame::Subscribe { request_id, room } => {
                let reply = match self.subscribe(peer_id, &room) {
                    Ok(()) => RelayFrame::Ack { request_id },
                    Err(error) => RelayFrame::Error {
                        request_id: Some(request_id),
                        error,
                    },
                };
                self.send_frame(&peer_id, &reply);
            }

            RelayFrame::Unsubscribe { room } => self.unsubscribe(&peer_id, &room),

            RelayFrame::Publish { room, message } => {
                if let Err(error) = self.publish(&peer_id, &room, message) {
                    warn!("Rejected publish from {}: {}", peer_id, error);
                    self.send_frame(
                        &peer_id,
                        &RelayFrame::Error {
                            request_id: None,
                            error,
                        },
                    );
                }
            }

            RelayFrame::FindRoom { request_id, opts } => {
                let reply = match self.directory.find_room(peer_id, opts).await {
                    Ok(assignment) => RelayFrame::Assigned {
                        request_id,
                        assignment,
                    },
                    Err(error) => RelayFrame::Error {
                        request_id: Some(request_id),
                        error,
                    },
                };
                self.send_frame(&peer_id, &reply);
            }

            RelayFrame::FetchRoom { request_id, room } => {
                let reply = match self.directory.fetch_room(room).await {
                    Ok(record) => RelayFrame::Room { request_id, record },
                    Err(error) => RelayFrame::Error {
                        request_id: Some(request_id),
                        error,
                    },
                };
                self.send_frame(&peer_id, &reply);
            }

            RelayFrame::LeaveRoom { request_id, room } => {
                let reply = match self.directory.leave_room(peer_id, room).await {
                    Ok(()) => RelayFrame::Ack { request_id },
                    Err(error) => RelayFrame::Error {
                        request_id: Some(request_id),
                        error,
                    },
                };
                self.send_frame(&peer_id, &reply);
            }

            other => {
                warn!("Peer {} sent a server-only frame: {:?}", peer_id, other);
                self.send_frame(
                    &peer_id,
                    &RelayFrame::Error {
                        request_id: None,
                        error: RoomError::BadRequest("server-only frame".to_owned()),
                    },
                );
            }
        }
    }

    /// Drops the socket of `peer_id` if it is still `tx`, announcing a
    /// `leave` in every room the peer was subscribed to.
    pub async fn disconnect(&self, peer_id: &PeerId, tx: &mpsc::UnboundedSender<Message>) {
        let current = self
            .inner
            .peers
            .remove_if(peer_id, |_, stored| stored.same_channel(tx))
            .is_some();
        if !current {
            debug!("Stale socket of {} closed", peer_id);
            return;
        }

        let rooms = self
            .inner
            .subscriptions
            .remove(peer_id)
            .map(|(_, rooms)| rooms)
            .unwrap_or_default();
        for room_id in &rooms {
            self.unsubscribe(peer_id, room_id);
            let frame = RelayFrame::Deliver {
                room: room_id.clone(),
                message: SignalMessage::Leave { sender: *peer_id },
            };
            let members: Vec<PeerId> = self
                .inner
                .rooms
                .get(room_id)
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default();
            for member in &members {
                self.send_frame(member, &frame);
            }
        }

        self.directory.disconnect(*peer_id).await;
        info!(
            "Peer {} disconnected, left {} room(s)",
            peer_id,
            rooms.len()
        );
    }
}
