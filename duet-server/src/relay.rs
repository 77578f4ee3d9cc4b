use crate::directory::DirectoryHandle;
use crate::error::RelayError;
use crate::signaling::{RelayService, ws_handler};
use axum::Router;
use axum::routing::get;
use duet_core::IceServerConfig;
use duet_core::utils::default_ice_servers;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    /// Pushed to every client in its `Welcome` frame.
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ice_servers: default_ice_servers(),
        }
    }
}

/// `GET /ws/{peer_id}` upgraded to the relay protocol. Browsers on other
/// origins are allowed in.
pub fn router(service: RelayService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/{peer_id}", get(ws_handler))
        .layer(cors)
        .with_state(service)
}

pub async fn serve(config: RelayConfig) -> Result<(), RelayError> {
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(RelayError::Bind)?;
    serve_on(listener, config.ice_servers).await
}

/// Runs the relay on an already bound listener until the server stops.
pub async fn serve_on(
    listener: TcpListener,
    ice_servers: Vec<IceServerConfig>,
) -> Result<(), RelayError> {
    let service = RelayService::new(DirectoryHandle::spawn(), ice_servers);
    let app = router(service);

    if let Ok(addr) = listener.local_addr() {
        info!("Signaling relay listening on ws://{}", addr);
    }
    axum::serve(listener, app).await.map_err(RelayError::Serve)
}
