use crate::candidate_buffer::CandidateBuffer;
use crate::error::{CallError, Result};
use crate::media::{LocalMediaStream, RemoteMediaStream};
use crate::transport::{
    PeerTransport, TransportConfig, TransportEvent, TransportFactory, TransportState,
};
use duet_core::{IceCandidate, Role, SdpType, SessionDescription};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    Connected,
    Closed,
}

/// What happened to a remote candidate handed to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    Applied,
    Deferred,
    /// The attempt is over; the candidate was thrown away.
    Dropped,
}

/// Outcome of a transport callback, for the call controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    RemoteStream(RemoteMediaStream),
    Connected,
    /// The transport broke. Terminal for the attempt.
    Lost(String),
}

/// Owns the transport of exactly one call attempt.
///
/// Negotiation happens once. Any description or candidate failure and any
/// terminal transport state end the attempt; nothing is retried here.
pub struct PeerConnectionManager {
    role: Role,
    generation: u64,
    transport: Option<Box<dyn PeerTransport>>,
    buffer: CandidateBuffer,
    state: NegotiationState,
    remote_description_set: bool,
    local_description: Option<SessionDescription>,
    remote_stream: RemoteMediaStream,
    applied_candidates: usize,
}

fn platform(context: &str, err: anyhow::Error) -> CallError {
    CallError::Negotiation(format!("{}: {:#}", context, err))
}

impl PeerConnectionManager {
    pub fn new(role: Role, generation: u64) -> Self {
        Self {
            role,
            generation,
            transport: None,
            buffer: CandidateBuffer::new(),
            state: NegotiationState::New,
            remote_description_set: false,
            local_description: None,
            remote_stream: RemoteMediaStream::default(),
            applied_candidates: 0,
        }
    }

    /// Builds the transport and attaches every local track. The returned
    /// receiver carries the transport's callbacks for this attempt only.
    pub async fn open(
        &mut self,
        factory: &dyn TransportFactory,
        config: &TransportConfig,
        local_stream: &LocalMediaStream,
    ) -> Result<mpsc::Receiver<TransportEvent>> {
        if self.transport.is_some() || self.state != NegotiationState::New {
            return Err(CallError::negotiation(
                "open",
                "peer connection already opened for this attempt",
            ));
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let transport = factory
            .create(config, event_tx)
            .await
            .map_err(|e| platform("create transport", e))?;

        for track in local_stream.tracks() {
            if let Err(e) = transport.add_track(track, local_stream.id()).await {
                let _ = transport.close().await;
                return Err(platform("attach local track", e));
            }
        }

        info!(
            "Attempt {} opened as {} with {} local tracks",
            self.generation,
            self.role,
            local_stream.tracks().len()
        );
        self.transport = Some(transport);
        Ok(event_rx)
    }

    /// Offerer only: creates an offer and sets it as the local description.
    pub async fn create_offer_and_set_local(&mut self) -> Result<SessionDescription> {
        self.expect_role(Role::Offerer, "create offer")?;
        if self.state != NegotiationState::New {
            return Err(CallError::negotiation(
                "create offer",
                format!("already negotiating ({:?})", self.state),
            ));
        }
        let transport = self.transport()?;

        let offer = transport
            .create_offer()
            .await
            .map_err(|e| platform("create offer", e))?;
        transport
            .set_local_description(offer.clone())
            .await
            .map_err(|e| platform("set local offer", e))?;

        self.state = NegotiationState::HaveLocalOffer;
        self.local_description = Some(offer.clone());
        debug!("Attempt {} has local offer", self.generation);
        Ok(offer)
    }

    /// Answerer only: applies the remote offer, flushes buffered candidates,
    /// and creates and sets the answer.
    pub async fn apply_remote_offer_and_answer(
        &mut self,
        offer: SessionDescription,
    ) -> Result<SessionDescription> {
        self.expect_role(Role::Answerer, "apply remote offer")?;
        if self.state != NegotiationState::New {
            return Err(CallError::negotiation(
                "apply remote offer",
                format!("already negotiating ({:?})", self.state),
            ));
        }
        if offer.kind != SdpType::Offer {
            return Err(CallError::negotiation(
                "apply remote offer",
                "description is not an offer",
            ));
        }

        self.transport()?
            .set_remote_description(offer)
            .await
            .map_err(|e| platform("set remote offer", e))?;
        self.remote_description_set = true;
        self.state = NegotiationState::HaveRemoteOffer;

        self.flush_candidates().await?;

        let transport = self.transport()?;
        let answer = transport
            .create_answer()
            .await
            .map_err(|e| platform("create answer", e))?;
        transport
            .set_local_description(answer.clone())
            .await
            .map_err(|e| platform("set local answer", e))?;

        self.local_description = Some(answer.clone());
        debug!("Attempt {} answered remote offer", self.generation);
        Ok(answer)
    }

    /// Offerer only: applies the remote answer and flushes buffered candidates.
    pub async fn apply_remote_answer(&mut self, answer: SessionDescription) -> Result<()> {
        self.expect_role(Role::Offerer, "apply remote answer")?;
        if self.state != NegotiationState::HaveLocalOffer || self.remote_description_set {
            return Err(CallError::negotiation(
                "apply remote answer",
                format!("no offer awaiting an answer ({:?})", self.state),
            ));
        }
        if answer.kind != SdpType::Answer {
            return Err(CallError::negotiation(
                "apply remote answer",
                "description is not an answer",
            ));
        }

        self.transport()?
            .set_remote_description(answer)
            .await
            .map_err(|e| platform("set remote answer", e))?;
        self.remote_description_set = true;

        self.flush_candidates().await?;
        debug!("Attempt {} applied remote answer", self.generation);
        Ok(())
    }

    /// Applies the candidate now if the remote description is known,
    /// otherwise keeps it until the description arrives.
    pub async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition> {
        if self.state == NegotiationState::Closed {
            return Ok(CandidateDisposition::Dropped);
        }
        if !self.remote_description_set {
            self.buffer.enqueue(candidate);
            debug!(
                "Attempt {} deferred remote candidate ({} buffered)",
                self.generation,
                self.buffer.len()
            );
            return Ok(CandidateDisposition::Deferred);
        }

        self.transport()?
            .add_ice_candidate(candidate)
            .await
            .map_err(|e| platform("add remote candidate", e))?;
        self.applied_candidates += 1;
        Ok(CandidateDisposition::Applied)
    }

    /// Folds one transport callback into the manager state.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Option<PeerEvent> {
        if self.state == NegotiationState::Closed {
            return None;
        }

        match event {
            TransportEvent::CandidateGenerated(candidate) => {
                Some(PeerEvent::LocalCandidate(candidate))
            }
            TransportEvent::RemoteTrack(track) => {
                debug!(
                    "Attempt {} received remote {} track {}",
                    self.generation, track.kind, track.id
                );
                self.remote_stream.add(track);
                Some(PeerEvent::RemoteStream(self.remote_stream.clone()))
            }
            TransportEvent::StateChanged(TransportState::Connected) => {
                if self.state == NegotiationState::Connected {
                    return None;
                }
                info!("Attempt {} connected", self.generation);
                self.state = NegotiationState::Connected;
                Some(PeerEvent::Connected)
            }
            TransportEvent::StateChanged(state) if state.is_terminal() => {
                warn!("Attempt {} transport ended: {:?}", self.generation, state);
                Some(PeerEvent::Lost(format!("transport {:?}", state)))
            }
            TransportEvent::StateChanged(_) => None,
        }
    }

    /// Releases the transport and everything tied to the attempt. Returns
    /// `false` when the manager was already closed.
    pub async fn close(&mut self) -> bool {
        if self.state == NegotiationState::Closed {
            return false;
        }
        self.state = NegotiationState::Closed;

        let dropped = self.buffer.discard();
        if let Some(transport) = self.transport.take()
            && let Err(e) = transport.close().await
        {
            warn!("Attempt {} transport close failed: {:#}", self.generation, e);
        }
        self.remote_stream = RemoteMediaStream::default();
        self.local_description = None;

        info!(
            "Attempt {} closed ({} buffered candidates dropped)",
            self.generation, dropped
        );
        true
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set
    }

    /// The offer or answer this side produced, while the attempt is live.
    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_stream(&self) -> &RemoteMediaStream {
        &self.remote_stream
    }

    pub fn buffered_candidates(&self) -> usize {
        self.buffer.len()
    }

    pub fn applied_candidates(&self) -> usize {
        self.applied_candidates
    }

    fn expect_role(&self, role: Role, operation: &str) -> Result<()> {
        if self.role != role {
            return Err(CallError::negotiation(
                operation,
                format!("not allowed for the {}", self.role),
            ));
        }
        Ok(())
    }

    fn transport(&self) -> Result<&dyn PeerTransport> {
        self.transport
            .as_deref()
            .ok_or_else(|| CallError::negotiation("transport", "peer connection is not open"))
    }

    async fn flush_candidates(&mut self) -> Result<()> {
        let transport = self
            .transport
            .as_deref()
            .ok_or_else(|| CallError::negotiation("transport", "peer connection is not open"))?;

        let applied = self
            .buffer
            .flush(|candidate| transport.add_ice_candidate(candidate))
            .await
            .map_err(|e| platform("apply buffered candidate", e))?;

        self.applied_candidates += applied;
        if applied > 0 {
            debug!(
                "Attempt {} flushed {} buffered candidates",
                self.generation, applied
            );
        }
        Ok(())
    }
}
