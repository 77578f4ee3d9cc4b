mod attempt;
mod state;

pub use state::{CallPhase, CallSnapshot};

use crate::directory::SessionDirectory;
use crate::error::{CallError, Result};
use crate::media::{LocalMediaStream, MediaConstraints, MediaSource, TrackKind};
use crate::peer_connection::PeerConnectionManager;
use crate::signaling::{SignalingChannel, SubscriptionHandle};
use crate::transport::{TransportConfig, TransportFactory};
use attempt::{Attempt, AttemptWorker};
use duet_core::{PeerId, RoomId, RoomOptions, RoomRecord, SignalMessage, assign_role};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

/// What happens when the remote side goes away mid-call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PeerLostPolicy {
    /// Stop in `Ended` and wait for the user.
    #[default]
    End,
    /// Go straight back to matchmaking.
    Requeue,
}

#[derive(Debug, Clone, Default)]
pub struct CallConfig {
    pub transport: TransportConfig,
    pub media: MediaConstraints,
    pub peer_lost: PeerLostPolicy,
}

/// The collaborators a call is built from.
#[derive(Clone)]
pub struct CallDeps {
    pub media: Arc<dyn MediaSource>,
    pub directory: Arc<dyn SessionDirectory>,
    pub signaling: Arc<dyn SignalingChannel>,
    pub transports: Arc<dyn TransportFactory>,
}

enum RoomTarget {
    Match(RoomOptions),
    Existing(RoomId),
}

#[derive(Default)]
struct Session {
    user_id: Option<PeerId>,
    local_stream: Option<LocalMediaStream>,
    attempt: Option<Attempt>,
    left: bool,
}

pub(crate) struct ControllerInner {
    deps: CallDeps,
    config: CallConfig,
    state: Arc<watch::Sender<CallSnapshot>>,
    session: Mutex<Session>,
    generation: Arc<AtomicU64>,
}

/// Drives one participant through media acquisition, matchmaking and
/// negotiation, one attempt at a time.
///
/// Every attempt gets a fresh generation number. Starting a new round or
/// leaving bumps it, aborts and joins the attempt worker and closes the
/// transport, so nothing from an old attempt can touch the new one.
#[derive(Clone)]
pub struct CallController {
    inner: Arc<ControllerInner>,
}

impl CallController {
    pub fn new(deps: CallDeps, config: CallConfig) -> Self {
        let (state, _) = watch::channel(CallSnapshot::default());
        Self {
            inner: Arc::new(ControllerInner {
                deps,
                config,
                state: Arc::new(state),
                session: Mutex::new(Session::default()),
                generation: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CallSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Acquires local media for `user_id`. On failure the call moves to
    /// `Failed(MediaAccessDenied)` and nothing else happens.
    pub async fn start(&self, user_id: PeerId) -> Result<()> {
        let generation = {
            let mut session = self.inner.session.lock().await;
            if session.local_stream.is_some() {
                return Ok(());
            }
            session.user_id = Some(user_id);
            session.left = false;
            self.inner.next_generation()
        };

        self.inner.state.send_modify(|s| {
            s.phase = CallPhase::AcquiringMedia;
            s.error = None;
        });

        let stream = match self.inner.deps.media.acquire(&self.inner.config.media).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Media acquisition for {} failed: {}", user_id, err);
                return Err(self.inner.fail(generation, err));
            }
        };

        let mut session = self.inner.session.lock().await;
        if !self.inner.is_current(generation) || session.left {
            stream.stop();
            return Ok(());
        }
        session.local_stream = Some(stream.clone());
        self.inner.state.send_modify(|s| {
            s.phase = CallPhase::AwaitingRoom;
            s.audio_enabled = stream.tracks_of(TrackKind::Audio).any(|t| t.is_enabled());
            s.video_enabled = stream.tracks_of(TrackKind::Video).any(|t| t.is_enabled());
            s.local_stream = Some(stream);
        });
        info!("Local media ready for {}", user_id);
        Ok(())
    }

    /// First matchmaking round.
    pub async fn find_partner(&self) -> Result<()> {
        Arc::clone(&self.inner)
            .run_round(RoomTarget::Match(RoomOptions::default()), None)
            .await
    }

    /// Joins (or opens) the named room instead of matching randomly.
    pub async fn join_invite(&self, room_id: RoomId) -> Result<()> {
        Arc::clone(&self.inner)
            .run_round(RoomTarget::Match(RoomOptions::invite(room_id)), None)
            .await
    }

    /// Joins a room this participant already belongs to, deriving the role
    /// from the directory's record. Fails closed if the record does not
    /// list us.
    pub async fn join_room(&self, room_id: RoomId) -> Result<()> {
        Arc::clone(&self.inner)
            .run_round(RoomTarget::Existing(room_id), None)
            .await
    }

    /// Tears the current attempt down and matches again.
    pub async fn request_next_partner(&self) -> Result<()> {
        Arc::clone(&self.inner)
            .run_round(RoomTarget::Match(RoomOptions::default()), None)
            .await
    }

    /// Ends the call and releases local media. Calling it again does nothing.
    pub async fn leave(&self) -> Result<()> {
        let (attempt, stream) = {
            let mut session = self.inner.session.lock().await;
            if session.left {
                return Ok(());
            }
            session.left = true;
            self.inner.next_generation();
            (session.attempt.take(), session.local_stream.take())
        };

        if let Some(attempt) = attempt {
            self.inner.release(attempt).await;
        }
        if let Some(stream) = stream {
            let stopped = stream.stop();
            debug!("Stopped {} local tracks", stopped);
        }

        self.inner.state.send_modify(|s| {
            s.clear_attempt();
            s.local_stream = None;
            s.phase = CallPhase::Ended;
        });
        info!("Left the call");
        Ok(())
    }

    /// Enables or mutes local audio. Returns how many tracks changed.
    pub async fn toggle_audio(&self, enabled: bool) -> usize {
        self.toggle(TrackKind::Audio, enabled).await
    }

    pub async fn toggle_video(&self, enabled: bool) -> usize {
        self.toggle(TrackKind::Video, enabled).await
    }

    pub fn dismiss_error(&self) {
        self.inner.state.send_if_modified(|s| s.error.take().is_some());
    }

    async fn toggle(&self, kind: TrackKind, enabled: bool) -> usize {
        let session = self.inner.session.lock().await;
        let Some(stream) = &session.local_stream else {
            return 0;
        };
        let changed = stream.set_enabled(kind, enabled);
        self.inner.state.send_modify(|s| match kind {
            TrackKind::Audio => s.audio_enabled = enabled,
            TrackKind::Video => s.video_enabled = enabled,
        });
        debug!("{} {} track(s) set enabled={}", changed, kind, enabled);
        changed
    }
}

impl ControllerInner {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Marks the call failed if `generation` is still the live one.
    fn fail(&self, generation: u64, err: CallError) -> CallError {
        if self.is_current(generation) {
            self.state.send_modify(|s| s.fail(err.clone()));
        }
        err
    }

    /// Starts a new attempt. With `expected` set, does nothing unless that
    /// generation is still the live one.
    async fn run_round(self: Arc<Self>, target: RoomTarget, expected: Option<u64>) -> Result<()> {
        let (user_id, local_stream, generation, previous) = {
            let mut session = self.session.lock().await;
            if let Some(expected) = expected
                && !self.is_current(expected)
            {
                return Ok(());
            }
            let (Some(user_id), Some(local_stream)) = (session.user_id, session.local_stream.clone())
            else {
                return Err(CallError::NotStarted);
            };
            let generation = self.next_generation();
            (user_id, local_stream, generation, session.attempt.take())
        };

        if let Some(previous) = previous {
            self.release(previous).await;
        }
        if !self.is_current(generation) {
            return Ok(());
        }
        self.state.send_modify(|s| {
            s.clear_attempt();
            s.phase = CallPhase::AwaitingRoom;
        });

        let record = match target {
            RoomTarget::Match(opts) => self
                .deps
                .directory
                .create_or_join_room(&user_id, &opts)
                .await
                .map(|assignment| assignment.record),
            RoomTarget::Existing(room_id) => self.deps.directory.fetch_room(&room_id).await,
        };
        let record = match record {
            Ok(record) => record,
            Err(err) => return Err(self.fail(generation, err)),
        };
        if !self.is_current(generation) {
            self.give_back(&user_id, &record.room_id, None).await;
            return Ok(());
        }

        self.open_attempt(user_id, local_stream, record, generation)
            .await
    }

    async fn open_attempt(
        self: Arc<Self>,
        user_id: PeerId,
        local_stream: LocalMediaStream,
        record: RoomRecord,
        generation: u64,
    ) -> Result<()> {
        let role = match assign_role(&user_id, &record) {
            Ok(role) => role,
            Err(conflict) => return Err(self.fail(generation, conflict.into())),
        };

        let mut manager = PeerConnectionManager::new(role, generation);
        let events = match manager
            .open(
                self.deps.transports.as_ref(),
                &self.config.transport,
                &local_stream,
            )
            .await
        {
            Ok(events) => events,
            Err(err) => {
                self.give_back(&user_id, &record.room_id, None).await;
                return Err(self.fail(generation, err));
            }
        };

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let subscription = match self
            .deps
            .signaling
            .subscribe(&record.room_id, signal_tx)
            .await
        {
            Ok(subscription) => subscription,
            Err(err) => {
                manager.close().await;
                self.give_back(&user_id, &record.room_id, None).await;
                return Err(self.fail(generation, err));
            }
        };
        let manager = Arc::new(Mutex::new(manager));

        let mut session = self.session.lock().await;
        if !self.is_current(generation) || session.left {
            drop(session);
            manager.lock().await.close().await;
            self.give_back(&user_id, &record.room_id, Some(&subscription))
                .await;
            return Ok(());
        }

        self.state.send_modify(|s| {
            s.phase = CallPhase::Negotiating;
            s.room_id = Some(record.room_id.clone());
            s.role = Some(role);
            s.error = None;
        });

        let worker = AttemptWorker {
            controller: Arc::downgrade(&self),
            current_generation: Arc::clone(&self.generation),
            generation,
            user_id,
            record: record.clone(),
            role,
            manager: Arc::clone(&manager),
            signaling: Arc::clone(&self.deps.signaling),
            directory: Arc::clone(&self.deps.directory),
            state: Arc::clone(&self.state),
            sent_candidates: Vec::new(),
        }
        .spawn(signal_rx, events);

        info!(
            "Attempt {} joined room {} as {}",
            generation, record.room_id, role
        );
        session.attempt = Some(Attempt {
            generation,
            user_id,
            record,
            manager,
            subscription,
            worker,
        });
        Ok(())
    }

    /// Cancels in-flight work, closes the transport, says goodbye on the
    /// room and gives the room back to the directory.
    async fn release(&self, attempt: Attempt) {
        attempt.worker.abort();
        let _ = attempt.worker.await;

        attempt.manager.lock().await.close().await;
        self.give_back(
            &attempt.user_id,
            &attempt.record.room_id,
            Some(&attempt.subscription),
        )
        .await;
        debug!("Attempt {} released", attempt.generation);
    }

    /// Says goodbye on the room if we were listening on it and returns the
    /// room to the directory, so nobody is matched against a participant
    /// that is gone.
    async fn give_back(
        &self,
        user_id: &PeerId,
        room_id: &RoomId,
        subscription: Option<&SubscriptionHandle>,
    ) {
        if let Some(subscription) = subscription {
            if let Err(e) = self
                .deps
                .signaling
                .publish(room_id, SignalMessage::Leave { sender: *user_id })
                .await
            {
                debug!("Could not announce leave on room {}: {}", room_id, e);
            }
            self.deps.signaling.unsubscribe(subscription).await;
        }

        if let Err(e) = self.deps.directory.leave_room(user_id, room_id).await {
            warn!("Directory refused leave of room {}: {}", room_id, e);
        }
    }

    /// Called from a finished attempt worker.
    pub(crate) fn attempt_ended(
        self: Arc<Self>,
        generation: u64,
        outcome: CallError,
    ) -> BoxFuture<'static, ()> {
        async move {
            if !outcome.is_fatal() && self.config.peer_lost == PeerLostPolicy::Requeue {
                info!("Peer lost on attempt {}, requeueing", generation);
                let target = RoomTarget::Match(RoomOptions::default());
                if let Err(e) = Arc::clone(&self).run_round(target, Some(generation)).await {
                    warn!("Requeue after attempt {} failed: {}", generation, e);
                }
                return;
            }

            let (attempt, ended_generation) = {
                let mut session = self.session.lock().await;
                if !self.is_current(generation) {
                    return;
                }
                (session.attempt.take(), self.next_generation())
            };
            if let Some(attempt) = attempt {
                self.release(attempt).await;
            }
            if !self.is_current(ended_generation) {
                return;
            }

            self.state.send_modify(|s| {
                if outcome.is_fatal() {
                    s.fail(outcome);
                } else {
                    s.clear_attempt();
                    s.phase = CallPhase::Ended;
                }
            });
        }
        .boxed()
    }
}
