use duet_core::{RoleConflict, RoomError};
use thiserror::Error;

/// Everything the call controller can observe going wrong.
///
/// Platform errors never cross into the controller as-is: the peer
/// connection manager and the signaling channels translate them into one of
/// these variants.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum CallError {
    /// Camera or microphone could not be opened. Fatal and user-actionable.
    #[error("camera or microphone access denied: {0}")]
    MediaAccessDenied(String),

    /// The signaling transport is down; reconnect the channel.
    #[error("signaling unavailable: {0}")]
    SignalingUnavailable(String),

    /// A description or candidate was rejected. Ends the current attempt only.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// The remote participant went away.
    #[error("peer left the call")]
    PeerLost,

    #[error(transparent)]
    RoleConflict(#[from] RoleConflict),

    /// A room was requested before `start` acquired local media.
    #[error("call not started: acquire local media first")]
    NotStarted,
}

/// A room the directory cannot hand out (missing, abandoned, or already
/// holding two participants) leaves no slot to derive a role from, so it
/// fails closed as a role conflict. A rejected request is a protocol fault
/// between us and the directory.
impl From<RoomError> for CallError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::BadRequest(detail) => {
                CallError::SignalingUnavailable(format!("directory rejected request: {}", detail))
            }
            unavailable => CallError::RoleConflict(RoleConflict::Unavailable(unavailable)),
        }
    }
}

impl CallError {
    pub(crate) fn negotiation(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Negotiation(format!("{}: {}", context, err))
    }

    pub(crate) fn signaling(context: &str, err: impl std::fmt::Display) -> Self {
        Self::SignalingUnavailable(format!("{}: {}", context, err))
    }

    /// Whether the error should be shown to the user as a dismissable message.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CallError::PeerLost)
    }
}

pub type Result<T, E = CallError> = std::result::Result<T, E>;
