use duet_core::IceServerConfig;
use duet_core::utils::DEFAULT_STUN_ADDR;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::Level;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Starts a relay on an ephemeral loopback port.
pub async fn spawn_relay() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind relay listener");
    let addr = listener.local_addr().expect("relay address");

    tokio::spawn(async move {
        let ice_servers = vec![IceServerConfig::stun(DEFAULT_STUN_ADDR)];
        if let Err(e) = duet_server::serve_on(listener, ice_servers).await {
            tracing::error!("Test relay stopped: {}", e);
        }
    });

    addr
}
