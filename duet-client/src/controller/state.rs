use crate::error::CallError;
use crate::media::{LocalMediaStream, RemoteMediaStream};
use duet_core::{Role, RoomId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    AcquiringMedia,
    AwaitingRoom,
    Negotiating,
    Connected,
    Ended,
    Failed(CallError),
}

impl CallPhase {
    pub fn is_failed(&self) -> bool {
        matches!(self, CallPhase::Failed(_))
    }
}

/// What the UI renders. Published on every transition.
#[derive(Debug, Clone)]
pub struct CallSnapshot {
    pub phase: CallPhase,
    pub room_id: Option<RoomId>,
    pub role: Option<Role>,
    pub local_stream: Option<LocalMediaStream>,
    pub remote_stream: Option<RemoteMediaStream>,
    pub is_connected: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub error: Option<CallError>,
}

impl Default for CallSnapshot {
    fn default() -> Self {
        Self {
            phase: CallPhase::Idle,
            room_id: None,
            role: None,
            local_stream: None,
            remote_stream: None,
            is_connected: false,
            audio_enabled: true,
            video_enabled: true,
            error: None,
        }
    }
}

impl CallSnapshot {
    pub(crate) fn clear_attempt(&mut self) {
        self.room_id = None;
        self.role = None;
        self.remote_stream = None;
        self.is_connected = false;
    }

    pub(crate) fn fail(&mut self, err: CallError) {
        self.clear_attempt();
        self.phase = CallPhase::Failed(err.clone());
        self.error = Some(err);
    }
}
