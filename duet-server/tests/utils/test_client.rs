use anyhow::{Context, Result, bail};
use duet_core::{
    IceServerConfig, PeerId, RelayFrame, RequestId, RoomAssignment, RoomId, RoomOptions,
    SignalMessage,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw relay client speaking frames directly.
pub struct TestClient {
    pub peer_id: PeerId,
    pub ice_servers: Vec<IceServerConfig>,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_request: RequestId,
}

impl TestClient {
    /// Connects and consumes the `Welcome` frame.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let peer_id = PeerId::new();
        let url = format!("ws://{}/ws/{}", addr, peer_id);
        let (ws, _) = connect_async(url.as_str())
            .await
            .context("WebSocket connect failed")?;

        let mut client = Self {
            peer_id,
            ice_servers: Vec::new(),
            ws,
            next_request: 1,
        };
        match client.recv().await? {
            RelayFrame::Welcome {
                peer_id: greeted,
                ice_servers,
            } if greeted == peer_id => client.ice_servers = ice_servers,
            other => bail!("expected Welcome, got {:?}", other),
        }
        Ok(client)
    }

    pub async fn send(&mut self, frame: &RelayFrame) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        self.ws.send(Message::Text(json.into())).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<RelayFrame> {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for a frame")?
                .context("socket closed")??;
            if let Message::Text(text) = msg {
                return Ok(serde_json::from_str(text.as_str())?);
            }
        }
    }

    /// `true` when nothing arrives within `wait`.
    pub async fn is_quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.ws.next()).await.is_err()
    }

    pub fn next_request_id(&mut self) -> RequestId {
        let id = self.next_request;
        self.next_request += 1;
        id
    }

    pub async fn subscribe(&mut self, room: &RoomId) -> Result<RelayFrame> {
        let request_id = self.next_request_id();
        self.send(&RelayFrame::Subscribe {
            request_id,
            room: room.clone(),
        })
        .await?;
        self.recv().await
    }

    pub async fn publish(&mut self, room: &RoomId, message: SignalMessage) -> Result<()> {
        self.send(&RelayFrame::Publish {
            room: room.clone(),
            message,
        })
        .await
    }

    pub async fn find_room(&mut self, opts: RoomOptions) -> Result<RoomAssignment> {
        let request_id = self.next_request_id();
        self.send(&RelayFrame::FindRoom { request_id, opts }).await?;
        match self.recv().await? {
            RelayFrame::Assigned {
                request_id: answered,
                assignment,
            } if answered == request_id => Ok(assignment),
            other => bail!("expected Assigned, got {:?}", other),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
