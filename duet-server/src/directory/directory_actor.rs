use crate::directory::DirectoryCommand;
use duet_core::{PeerId, RoomAssignment, RoomError, RoomId, RoomOptions, RoomRecord, RoomRegistry};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const COMMAND_QUEUE_CAPACITY: usize = 100;

/// Owns the room registry and serializes every matchmaking request.
pub struct DirectoryActor {
    registry: RoomRegistry,
    command_rx: mpsc::Receiver<DirectoryCommand>,
}

impl DirectoryActor {
    pub fn new(command_rx: mpsc::Receiver<DirectoryCommand>) -> Self {
        Self {
            registry: RoomRegistry::new(),
            command_rx,
        }
    }

    pub async fn run(mut self) {
        info!("Directory loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd);
        }

        info!("Directory loop finished");
    }

    fn handle_command(&mut self, cmd: DirectoryCommand) {
        match cmd {
            DirectoryCommand::FindRoom {
                peer_id,
                opts,
                reply,
            } => {
                let result = self.registry.create_or_join(peer_id, &opts);
                if let Ok(assignment) = &result {
                    info!(
                        "Peer {} assigned to room {} (slot {:?})",
                        peer_id, assignment.record.room_id, assignment.slot
                    );
                }
                let _ = reply.send(result);
            }

            DirectoryCommand::FetchRoom { room_id, reply } => {
                let _ = reply.send(self.registry.fetch(&room_id));
            }

            DirectoryCommand::LeaveRoom {
                peer_id,
                room_id,
                reply,
            } => {
                let result = self.registry.leave(&room_id, &peer_id);
                match &result {
                    Ok(()) => info!("Peer {} abandoned room {}", peer_id, room_id),
                    Err(e) => warn!("Peer {} could not leave room {}: {}", peer_id, room_id, e),
                }
                let _ = reply.send(result);
            }

            DirectoryCommand::Disconnect { peer_id } => {
                let abandoned = self.registry.abandon_waiting(&peer_id);
                if !abandoned.is_empty() {
                    debug!(
                        "Peer {} disconnected, abandoned {} waiting room(s)",
                        peer_id,
                        abandoned.len()
                    );
                }
            }
        }
    }
}

/// Cheap handle for talking to a running [`DirectoryActor`].
#[derive(Clone)]
pub struct DirectoryHandle {
    command_tx: mpsc::Sender<DirectoryCommand>,
}

impl DirectoryHandle {
    /// Starts the actor on the current runtime.
    pub fn spawn() -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        tokio::spawn(DirectoryActor::new(command_rx).run());
        Self { command_tx }
    }

    pub async fn find_room(
        &self,
        peer_id: PeerId,
        opts: RoomOptions,
    ) -> Result<RoomAssignment, RoomError> {
        self.request(|reply| DirectoryCommand::FindRoom {
            peer_id,
            opts,
            reply,
        })
        .await
    }

    pub async fn fetch_room(&self, room_id: RoomId) -> Result<RoomRecord, RoomError> {
        self.request(|reply| DirectoryCommand::FetchRoom { room_id, reply })
            .await
    }

    pub async fn leave_room(&self, peer_id: PeerId, room_id: RoomId) -> Result<(), RoomError> {
        self.request(|reply| DirectoryCommand::LeaveRoom {
            peer_id,
            room_id,
            reply,
        })
        .await
    }

    pub async fn disconnect(&self, peer_id: PeerId) {
        let _ = self
            .command_tx
            .send(DirectoryCommand::Disconnect { peer_id })
            .await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, RoomError>>) -> DirectoryCommand,
    ) -> Result<T, RoomError> {
        let (reply, rx) = oneshot::channel();
        if self.command_tx.send(build(reply)).await.is_err() {
            return Err(directory_offline());
        }
        rx.await.unwrap_or_else(|_| Err(directory_offline()))
    }
}

fn directory_offline() -> RoomError {
    RoomError::BadRequest("directory offline".to_owned())
}
