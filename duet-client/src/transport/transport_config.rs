use duet_core::IceServerConfig;
use duet_core::utils::{DEFAULT_STUN_ADDR, default_ice_servers};

/// ICE configuration for one peer connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
        }
    }
}

impl TransportConfig {
    /// Configured servers, with the public STUN server added when none of
    /// them is a STUN server.
    pub fn effective_ice_servers(&self) -> Vec<IceServerConfig> {
        let mut servers = self.ice_servers.clone();
        if !servers.iter().any(IceServerConfig::is_stun) {
            servers.push(IceServerConfig::stun(DEFAULT_STUN_ADDR));
        }
        servers
    }
}
