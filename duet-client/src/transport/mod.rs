mod rtc;
mod transport_config;
mod transport_event;

pub use rtc::{RtcTransport, RtcTransportFactory};
pub use transport_config::TransportConfig;
pub use transport_event::{TransportEvent, TransportState};

use crate::media::MediaTrack;
use anyhow::Result;
use async_trait::async_trait;
use duet_core::{IceCandidate, SessionDescription};
use tokio::sync::mpsc;

/// Platform peer connection. Errors are raw platform errors; the peer
/// connection manager translates them.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: &MediaTrack, stream_id: &str) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Builds a fresh transport for each call attempt.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        config: &TransportConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>>;
}
