use super::{SignalingChannel, SubscriptionHandle};
use crate::directory::SessionDirectory;
use crate::error::{CallError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use duet_core::{
    Envelope, IceServerConfig, PeerId, RelayFrame, RequestId, RoomAssignment, RoomId,
    RoomOptions, RoomRecord, SignalMessage,
};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Subscribers = Vec<(u64, mpsc::UnboundedSender<Envelope>)>;

#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Base WebSocket url of the relay, e.g. `ws://127.0.0.1:8080`.
    pub url: String,
    pub request_timeout: Duration,
    pub reconnect_attempts: u32,
    /// Delay before the first reconnect; grows linearly per attempt.
    pub reconnect_backoff: Duration,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(10),
            reconnect_attempts: 5,
            reconnect_backoff: Duration::from_millis(500),
        }
    }
}

struct RelayInner {
    peer_id: PeerId,
    config: RelayClientConfig,
    outbound: mpsc::UnboundedSender<RelayFrame>,
    subscriptions: DashMap<RoomId, Subscribers>,
    pending: DashMap<RequestId, oneshot::Sender<RelayFrame>>,
    /// Subscribe requests replayed after a reconnect, by request id.
    resubscribing: DashMap<RequestId, RoomId>,
    ice_servers: watch::Sender<Vec<IceServerConfig>>,
    next_request: AtomicU64,
    next_subscription: AtomicU64,
    connected: AtomicBool,
    closed: AtomicBool,
    shutdown: Arc<Notify>,
}

/// WebSocket client of the duet relay.
///
/// One socket carries both the room-scoped signaling traffic and the
/// directory requests, so the same client serves as [`SignalingChannel`]
/// and [`SessionDirectory`]. A dropped socket is re-dialled in the
/// background and live subscriptions are restored; calls made while it is
/// down fail with `SignalingUnavailable`.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<RelayInner>,
}

impl RelayClient {
    pub async fn connect(config: RelayClientConfig, peer_id: PeerId) -> Result<Self> {
        let (ws, ice_servers) = open_socket(&config, &peer_id).await?;
        info!(
            "Connected to relay {} as {} ({} ICE servers offered)",
            config.url,
            peer_id,
            ice_servers.len()
        );

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        let inner = Arc::new(RelayInner::new(
            peer_id,
            config,
            outbound,
            ice_servers,
            Arc::clone(&shutdown),
        ));

        tokio::spawn(run_connection(
            Arc::downgrade(&inner),
            ws,
            outbound_rx,
            shutdown,
        ));

        Ok(Self { inner })
    }

    pub fn peer_id(&self) -> PeerId {
        self.inner.peer_id
    }

    /// ICE servers pushed by the relay in its latest greeting.
    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Closes the socket and stops reconnecting.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.connected.store(false, Ordering::SeqCst);
            self.inner.shutdown.notify_one();
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(CallError::SignalingUnavailable(
                "relay connection is down".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_self(&self, self_id: &PeerId, operation: &str) -> Result<()> {
        if *self_id != self.inner.peer_id {
            return Err(CallError::signaling(
                operation,
                format!("relay session belongs to {}", self.inner.peer_id),
            ));
        }
        Ok(())
    }

    async fn request(&self, build: impl FnOnce(RequestId) -> RelayFrame) -> Result<RelayFrame> {
        self.ensure_connected()?;
        let request_id = self.inner.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(request_id, tx);

        if self.inner.outbound.send(build(request_id)).is_err() {
            self.inner.pending.remove(&request_id);
            return Err(CallError::SignalingUnavailable(
                "relay connection closed".to_string(),
            ));
        }

        match timeout(self.inner.config.request_timeout, rx).await {
            Ok(Ok(RelayFrame::Error { error, .. })) => Err(error.into()),
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(CallError::SignalingUnavailable(
                "relay connection lost mid-request".to_string(),
            )),
            Err(_) => {
                self.inner.pending.remove(&request_id);
                Err(CallError::SignalingUnavailable(format!(
                    "relay request {} timed out",
                    request_id
                )))
            }
        }
    }
}

fn unexpected(operation: &str, frame: RelayFrame) -> CallError {
    CallError::signaling(operation, format!("unexpected reply {:?}", frame))
}

#[async_trait]
impl SignalingChannel for RelayClient {
    async fn subscribe(
        &self,
        room_id: &RoomId,
        sink: mpsc::UnboundedSender<Envelope>,
    ) -> Result<SubscriptionHandle> {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        let handle = SubscriptionHandle::new(id, room_id.clone());
        // Registered before the relay is asked so no delivery slips past.
        self.inner
            .subscriptions
            .entry(room_id.clone())
            .or_default()
            .push((id, sink));

        let room = room_id.clone();
        match self
            .request(|request_id| RelayFrame::Subscribe { request_id, room })
            .await
        {
            Ok(RelayFrame::Ack { .. }) => {
                debug!("Subscribed to room {} on the relay", room_id);
                Ok(handle)
            }
            Ok(other) => {
                self.unsubscribe(&handle).await;
                Err(unexpected("subscribe", other))
            }
            Err(e) => {
                self.unsubscribe(&handle).await;
                Err(e)
            }
        }
    }

    async fn publish(&self, room_id: &RoomId, message: SignalMessage) -> Result<()> {
        self.ensure_connected()?;
        self.inner
            .outbound
            .send(RelayFrame::Publish {
                room: room_id.clone(),
                message,
            })
            .map_err(|_| CallError::SignalingUnavailable("relay connection closed".to_string()))
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let room_id = handle.room_id();
        let now_empty = match self.inner.subscriptions.get_mut(room_id) {
            Some(mut subs) => {
                let before = subs.len();
                subs.retain(|(id, _)| *id != handle.id());
                before != subs.len() && subs.is_empty()
            }
            None => false,
        };
        if !now_empty {
            return;
        }

        self.inner
            .subscriptions
            .remove_if(room_id, |_, subs| subs.is_empty());
        if self.is_connected() {
            let _ = self.inner.outbound.send(RelayFrame::Unsubscribe {
                room: room_id.clone(),
            });
        }
        debug!("Released room {} on the relay", room_id);
    }
}

#[async_trait]
impl SessionDirectory for RelayClient {
    async fn create_or_join_room(
        &self,
        self_id: &PeerId,
        opts: &RoomOptions,
    ) -> Result<RoomAssignment> {
        self.ensure_self(self_id, "find room")?;
        let opts = opts.clone();
        match self
            .request(|request_id| RelayFrame::FindRoom { request_id, opts })
            .await?
        {
            RelayFrame::Assigned { assignment, .. } => Ok(assignment),
            other => Err(unexpected("find room", other)),
        }
    }

    async fn fetch_room(&self, room_id: &RoomId) -> Result<RoomRecord> {
        let room = room_id.clone();
        match self
            .request(|request_id| RelayFrame::FetchRoom { request_id, room })
            .await?
        {
            RelayFrame::Room { record, .. } => Ok(record),
            other => Err(unexpected("fetch room", other)),
        }
    }

    async fn leave_room(&self, self_id: &PeerId, room_id: &RoomId) -> Result<()> {
        self.ensure_self(self_id, "leave room")?;
        let room = room_id.clone();
        match self
            .request(|request_id| RelayFrame::LeaveRoom { request_id, room })
            .await?
        {
            RelayFrame::Ack { .. } => Ok(()),
            other => Err(unexpected("leave room", other)),
        }
    }
}

impl RelayInner {
    fn new(
        peer_id: PeerId,
        config: RelayClientConfig,
        outbound: mpsc::UnboundedSender<RelayFrame>,
        ice_servers: Vec<IceServerConfig>,
        shutdown: Arc<Notify>,
    ) -> Self {
        let (ice_servers, _) = watch::channel(ice_servers);
        Self {
            peer_id,
            config,
            outbound,
            subscriptions: DashMap::new(),
            pending: DashMap::new(),
            resubscribing: DashMap::new(),
            ice_servers,
            next_request: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            shutdown,
        }
    }

    fn dispatch(&self, text: &str) {
        let frame = match serde_json::from_str::<RelayFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Undecodable frame from relay: {}", e);
                return;
            }
        };

        match frame {
            RelayFrame::Deliver { room, message } => self.deliver(room, message),
            RelayFrame::Welcome { ice_servers, .. } => {
                self.ice_servers.send_replace(ice_servers);
            }
            RelayFrame::Error {
                request_id: None,
                error,
            } => warn!("Relay reported: {}", error),
            other => match response_id(&other) {
                Some(id) if self.resubscribing.contains_key(&id) => self.resubscribed(id, other),
                Some(id) => match self.pending.remove(&id) {
                    Some((_, tx)) => {
                        let _ = tx.send(other);
                    }
                    None => debug!("Relay answered request {} nobody waits for", id),
                },
                None => warn!("Unexpected frame from relay: {:?}", other),
            },
        }
    }

    fn deliver(&self, room: RoomId, message: SignalMessage) {
        let Some(mut subs) = self.subscriptions.get_mut(&room) else {
            debug!("Dropping {} for unsubscribed room {}", message.kind(), room);
            return;
        };
        subs.retain(|(_, sink)| {
            sink.send(Envelope {
                room_id: room.clone(),
                message: message.clone(),
            })
            .is_ok()
        });
    }

    /// A room the relay refused to restore is dropped locally. Closing its
    /// sinks ends the attempts listening on it.
    fn resubscribed(&self, request_id: RequestId, reply: RelayFrame) {
        let Some((_, room)) = self.resubscribing.remove(&request_id) else {
            return;
        };
        match reply {
            RelayFrame::Ack { .. } => debug!("Room {} restored on the relay", room),
            RelayFrame::Error { error, .. } => {
                error!("Relay refused to restore room {}: {}", room, error);
                self.subscriptions.remove(&room);
            }
            other => warn!("Unexpected resubscribe reply for room {}: {:?}", room, other),
        }
    }

    fn subscribed_rooms(&self) -> Vec<RoomId> {
        self.subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

fn response_id(frame: &RelayFrame) -> Option<RequestId> {
    match frame {
        RelayFrame::Assigned { request_id, .. }
        | RelayFrame::Room { request_id, .. }
        | RelayFrame::Ack { request_id } => Some(*request_id),
        RelayFrame::Error { request_id, .. } => *request_id,
        _ => None,
    }
}

async fn open_socket(
    config: &RelayClientConfig,
    peer_id: &PeerId,
) -> Result<(WsStream, Vec<IceServerConfig>)> {
    let url = format!("{}/ws/{}", config.url.trim_end_matches('/'), peer_id);
    let (mut ws, _) = connect_async(url.as_str())
        .await
        .map_err(|e| CallError::signaling("connect relay", e))?;

    let greeting = timeout(config.request_timeout, ws.next())
        .await
        .map_err(|_| CallError::SignalingUnavailable("relay did not greet in time".to_string()))?;

    match greeting {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<RelayFrame>(text.as_str()) {
            Ok(RelayFrame::Welcome {
                peer_id: greeted,
                ice_servers,
            }) if greeted == *peer_id => Ok((ws, ice_servers)),
            Ok(other) => Err(unexpected("greeting", other)),
            Err(e) => Err(CallError::signaling("decode greeting", e)),
        },
        Some(Ok(other)) => Err(CallError::signaling(
            "greeting",
            format!("unexpected message {:?}", other),
        )),
        Some(Err(e)) => Err(CallError::signaling("read greeting", e)),
        None => Err(CallError::SignalingUnavailable(
            "relay closed before greeting".to_string(),
        )),
    }
}

async fn run_connection(
    inner: Weak<RelayInner>,
    mut ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<RelayFrame>,
    shutdown: Arc<Notify>,
) {
    loop {
        if !pump(&inner, ws, &mut outbound, &shutdown).await {
            return;
        }

        let Some(strong) = inner.upgrade() else {
            return;
        };
        strong.connected.store(false, Ordering::SeqCst);
        // Dropping the senders fails every request still in flight.
        strong.pending.clear();

        match reconnect(&strong).await {
            Some(next) => ws = next,
            None => {
                error!("Giving up on relay {}", strong.config.url);
                strong.closed.store(true, Ordering::SeqCst);
                return;
            }
        }
    }
}

/// Moves frames until the socket ends. Returns `true` when the socket was
/// lost and should be re-dialled.
async fn pump(
    inner: &Weak<RelayInner>,
    ws: WsStream,
    outbound: &mut mpsc::UnboundedReceiver<RelayFrame>,
    shutdown: &Notify,
) -> bool {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                let _ = sink.send(Message::Close(None)).await;
                info!("Relay connection closed");
                return false;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return false;
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize relay frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    warn!("Relay write failed: {}", e);
                    return true;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Some(inner) = inner.upgrade() else {
                        return false;
                    };
                    inner.dispatch(text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => {
                    warn!("Relay closed the connection");
                    return true;
                }
                Some(Err(e)) => {
                    warn!("Relay read failed: {}", e);
                    return true;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

async fn reconnect(inner: &RelayInner) -> Option<WsStream> {
    for attempt in 1..=inner.config.reconnect_attempts {
        if inner.closed.load(Ordering::SeqCst) {
            return None;
        }
        sleep(inner.config.reconnect_backoff * attempt).await;

        let (mut ws, ice_servers) = match open_socket(&inner.config, &inner.peer_id).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Relay reconnect attempt {} failed: {}", attempt, e);
                continue;
            }
        };
        inner.ice_servers.send_replace(ice_servers);

        inner.resubscribing.clear();
        let mut restored = true;
        for room in inner.subscribed_rooms() {
            let request_id = inner.next_request.fetch_add(1, Ordering::Relaxed);
            inner.resubscribing.insert(request_id, room.clone());
            let frame = RelayFrame::Subscribe { request_id, room };
            let sent = match serde_json::to_string(&frame) {
                Ok(json) => ws.send(Message::Text(json.into())).await.is_ok(),
                Err(_) => false,
            };
            if !sent {
                restored = false;
                break;
            }
        }
        if !restored {
            warn!("Relay reconnect attempt {} lost the socket while resubscribing", attempt);
            continue;
        }

        inner.connected.store(true, Ordering::SeqCst);
        info!("Reconnected to relay after {} attempt(s)", attempt);
        return Some(ws);
    }
    None
}
