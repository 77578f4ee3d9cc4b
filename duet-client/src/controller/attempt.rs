use super::ControllerInner;
use super::state::{CallPhase, CallSnapshot};
use crate::directory::SessionDirectory;
use crate::error::CallError;
use crate::peer_connection::{NegotiationState, PeerConnectionManager, PeerEvent};
use crate::signaling::{SignalingChannel, SubscriptionHandle};
use crate::transport::TransportEvent;
use duet_core::{Envelope, IceCandidate, PeerId, Role, RoomRecord, SignalMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One call attempt: a room, a role, and the resources bound to them.
pub(crate) struct Attempt {
    pub(crate) generation: u64,
    pub(crate) user_id: PeerId,
    pub(crate) record: RoomRecord,
    pub(crate) manager: Arc<Mutex<PeerConnectionManager>>,
    pub(crate) subscription: SubscriptionHandle,
    pub(crate) worker: JoinHandle<()>,
}

enum Exit {
    /// A newer attempt took over. Nothing to report.
    Superseded,
    /// The attempt stopped on its own. `CallError::PeerLost` is the normal
    /// end of a call, anything else a failure.
    Ended(CallError),
}

impl From<CallError> for Exit {
    fn from(err: CallError) -> Self {
        Exit::Ended(err)
    }
}

type Step = Result<(), Exit>;

/// Serializes every signaling message and transport callback of one
/// attempt. Each step checks the attempt generation before touching state.
pub(crate) struct AttemptWorker {
    pub(crate) controller: Weak<ControllerInner>,
    pub(crate) current_generation: Arc<AtomicU64>,
    pub(crate) generation: u64,
    pub(crate) user_id: PeerId,
    pub(crate) record: RoomRecord,
    pub(crate) role: Role,
    pub(crate) manager: Arc<Mutex<PeerConnectionManager>>,
    pub(crate) signaling: Arc<dyn SignalingChannel>,
    pub(crate) directory: Arc<dyn SessionDirectory>,
    pub(crate) state: Arc<watch::Sender<CallSnapshot>>,
    /// Local candidates already published, replayed with the offer.
    pub(crate) sent_candidates: Vec<IceCandidate>,
}

impl AttemptWorker {
    pub(crate) fn spawn(
        self,
        signals: mpsc::UnboundedReceiver<Envelope>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(signals, events))
    }

    async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<Envelope>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        let mut step = self.begin().await;

        while step.is_ok() {
            step = tokio::select! {
                signal = signals.recv() => match signal {
                    Some(envelope) => self.handle_signal(envelope).await,
                    // The channel dropped our room, e.g. a refused resubscribe.
                    None => Err(Exit::from(CallError::SignalingUnavailable(format!(
                        "subscription to room {} lost",
                        self.record.room_id
                    )))),
                },
                Some(event) = events.recv() => self.handle_transport_event(event).await,
            };
        }

        match step {
            Err(Exit::Ended(err)) => self.finish(err).await,
            Err(Exit::Superseded) => {
                debug!("Attempt {} superseded", self.generation)
            }
            Ok(()) => {}
        }
    }

    fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    fn ensure_current(&self) -> Step {
        if self.is_current() {
            Ok(())
        } else {
            Err(Exit::Superseded)
        }
    }

    fn update_state(&self, apply: impl FnOnce(&mut CallSnapshot)) {
        if self.is_current() {
            self.state.send_modify(apply);
        }
    }

    async fn publish(&self, message: SignalMessage) -> Step {
        self.ensure_current()?;
        self.signaling
            .publish(&self.record.room_id, message)
            .await
            .map_err(Exit::from)
    }

    async fn begin(&mut self) -> Step {
        self.publish(SignalMessage::Join {
            sender: self.user_id,
        })
        .await?;

        if self.role == Role::Offerer {
            let offer = {
                let mut manager = self.manager.lock().await;
                self.ensure_current()?;
                manager.create_offer_and_set_local().await?
            };
            self.publish(SignalMessage::Offer {
                data: offer,
                sender: self.user_id,
            })
            .await?;
            info!(
                "Attempt {} published offer to room {}",
                self.generation, self.record.room_id
            );
        }
        Ok(())
    }

    async fn handle_signal(&mut self, envelope: Envelope) -> Step {
        self.ensure_current()?;
        if envelope.room_id != self.record.room_id {
            debug!(
                "Attempt {} ignoring {} for stale room {}",
                self.generation,
                envelope.message.kind(),
                envelope.room_id
            );
            return Ok(());
        }
        if envelope.message.is_from(&self.user_id) {
            return Ok(());
        }

        match envelope.message {
            SignalMessage::Offer { data, sender } => self.on_offer(data, sender).await,
            SignalMessage::Answer { data, .. } => self.on_answer(data).await,
            SignalMessage::Candidate { data, .. } => {
                let mut manager = self.manager.lock().await;
                self.ensure_current()?;
                let disposition = manager.add_remote_candidate(data).await?;
                debug!(
                    "Attempt {} remote candidate {:?}",
                    self.generation, disposition
                );
                Ok(())
            }
            SignalMessage::Join { sender } => self.on_remote_join(sender).await,
            SignalMessage::Leave { sender } => {
                info!("Peer {} left room {}", sender, self.record.room_id);
                Err(Exit::Ended(CallError::PeerLost))
            }
        }
    }

    async fn on_offer(&mut self, offer: duet_core::SessionDescription, sender: PeerId) -> Step {
        let answer = {
            let mut manager = self.manager.lock().await;
            self.ensure_current()?;
            if self.role != Role::Answerer || manager.state() != NegotiationState::New {
                debug!(
                    "Attempt {} ignoring offer from {} as {} in {:?}",
                    self.generation,
                    sender,
                    self.role,
                    manager.state()
                );
                return Ok(());
            }
            manager.apply_remote_offer_and_answer(offer).await?
        };

        self.publish(SignalMessage::Answer {
            data: answer,
            sender: self.user_id,
        })
        .await?;
        info!(
            "Attempt {} answered {} in room {}",
            self.generation, sender, self.record.room_id
        );
        Ok(())
    }

    async fn on_answer(&mut self, answer: duet_core::SessionDescription) -> Step {
        let mut manager = self.manager.lock().await;
        self.ensure_current()?;
        if self.role != Role::Offerer
            || manager.state() != NegotiationState::HaveLocalOffer
            || manager.has_remote_description()
        {
            debug!(
                "Attempt {} ignoring answer as {} in {:?}",
                self.generation,
                self.role,
                manager.state()
            );
            return Ok(());
        }
        manager.apply_remote_answer(answer).await?;
        Ok(())
    }

    /// The other side subscribed, possibly after our offer went out.
    async fn on_remote_join(&mut self, sender: PeerId) -> Step {
        let offer = {
            let manager = self.manager.lock().await;
            self.ensure_current()?;
            if self.role != Role::Offerer || manager.has_remote_description() {
                return Ok(());
            }
            match manager.local_description() {
                Some(offer) => offer.clone(),
                None => return Ok(()),
            }
        };

        debug!(
            "Attempt {} replaying offer and {} candidates for {}",
            self.generation,
            self.sent_candidates.len(),
            sender
        );
        self.publish(SignalMessage::Offer {
            data: offer,
            sender: self.user_id,
        })
        .await?;
        for candidate in self.sent_candidates.clone() {
            self.publish(SignalMessage::Candidate {
                data: candidate,
                sender: self.user_id,
            })
            .await?;
        }
        Ok(())
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) -> Step {
        let peer_event = {
            let mut manager = self.manager.lock().await;
            self.ensure_current()?;
            manager.handle_transport_event(event)
        };

        match peer_event {
            None => Ok(()),
            Some(PeerEvent::LocalCandidate(candidate)) => {
                self.sent_candidates.push(candidate.clone());
                self.publish(SignalMessage::Candidate {
                    data: candidate,
                    sender: self.user_id,
                })
                .await
            }
            Some(PeerEvent::RemoteStream(stream)) => {
                self.update_state(|s| s.remote_stream = Some(stream));
                Ok(())
            }
            Some(PeerEvent::Connected) => {
                self.update_state(|s| {
                    s.phase = CallPhase::Connected;
                    s.is_connected = true;
                    s.error = None;
                });
                info!(
                    "Attempt {} connected in room {}",
                    self.generation, self.record.room_id
                );
                self.directory
                    .peer_connected(&self.record, &self.user_id)
                    .await;
                Ok(())
            }
            Some(PeerEvent::Lost(reason)) => {
                info!("Attempt {} lost its peer: {}", self.generation, reason);
                Err(Exit::Ended(CallError::PeerLost))
            }
        }
    }

    /// Closes the transport right away so nothing more is applied, then
    /// hands the outcome to the controller on a separate task: the
    /// controller joins this worker while tearing the attempt down.
    async fn finish(self, err: CallError) {
        if err.is_fatal() {
            warn!("Attempt {} failed: {}", self.generation, err);
        } else {
            info!("Attempt {} ended: {}", self.generation, err);
        }
        self.manager.lock().await.close().await;

        if let Some(controller) = self.controller.upgrade() {
            tokio::spawn(controller.attempt_ended(self.generation, err));
        }
    }
}
