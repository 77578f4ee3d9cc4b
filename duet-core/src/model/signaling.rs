use crate::model::peer::PeerId;
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn is_stun(&self) -> bool {
        self.urls
            .iter()
            .any(|u| u.starts_with("stun:") || u.starts_with("stuns:"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description in the browser's `RTCSessionDescriptionInit` shape.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Network-path candidate in the browser's `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            ..Default::default()
        }
    }
}

/// Message exchanged between the two participants of a room.
///
/// Wire form: `{"type": "offer", "data": {...}, "sender": "<uuid>"}`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    Offer {
        data: SessionDescription,
        sender: PeerId,
    },
    Answer {
        data: SessionDescription,
        sender: PeerId,
    },
    Candidate {
        data: IceCandidate,
        sender: PeerId,
    },
    /// Presence: the sender subscribed to the room.
    Join { sender: PeerId },
    /// Presence: the sender abandoned the room.
    Leave { sender: PeerId },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
    Join,
    Leave,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
            SignalKind::Join => "join",
            SignalKind::Leave => "leave",
        };
        f.write_str(name)
    }
}

impl SignalMessage {
    pub fn sender(&self) -> &PeerId {
        match self {
            SignalMessage::Offer { sender, .. }
            | SignalMessage::Answer { sender, .. }
            | SignalMessage::Candidate { sender, .. }
            | SignalMessage::Join { sender }
            | SignalMessage::Leave { sender } => sender,
        }
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            SignalMessage::Offer { .. } => SignalKind::Offer,
            SignalMessage::Answer { .. } => SignalKind::Answer,
            SignalMessage::Candidate { .. } => SignalKind::Candidate,
            SignalMessage::Join { .. } => SignalKind::Join,
            SignalMessage::Leave { .. } => SignalKind::Leave,
        }
    }

    pub fn is_from(&self, peer_id: &PeerId) -> bool {
        self.sender() == peer_id
    }
}

/// A signaling message together with the room it was received on.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Envelope {
    pub room_id: RoomId,
    pub message: SignalMessage,
}
