use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by the room registry, locally or over the relay.
#[derive(Debug, Clone, Error, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    #[error("room {0} was abandoned")]
    Abandoned(RoomId),

    #[error("room {0} already has two participants")]
    Full(RoomId),

    #[error("malformed request: {0}")]
    BadRequest(String),
}
