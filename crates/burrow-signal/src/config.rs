//! Server configuration.

use std::time::Duration;

use burrow_common::protocol::IceServer;

use crate::turn::TurnMinter;

/// How many slots may wait for a peer at once.
pub const DEFAULT_MAX_SLOTS: u64 = 2048;

/// How long an unpaired slot waits before closing with `SlotTimedOut`.
/// Must be at least as generous as the clients' 30-second handshake
/// deadline.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a paired slot may spend on the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(120);

pub struct ServerConfig {
    /// Host names accepted in the Host header. Empty allows any.
    pub allowed_hosts: Vec<String>,
    /// Static STUN entries handed to every peer.
    pub stun_servers: Vec<IceServer>,
    /// When set, a freshly minted TURN entry is added to every init frame.
    pub turn: Option<TurnMinter>,
    pub max_slots: u64,
    pub idle_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            stun_servers: Vec::new(),
            turn: None,
            max_slots: DEFAULT_MAX_SLOTS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// The ICE server list for one init frame: static STUN entries plus a
    /// freshly minted TURN entry when a TURN secret is configured.
    pub fn ice_servers(&self) -> Vec<IceServer> {
        let mut servers = self.stun_servers.clone();
        if let Some(turn) = &self.turn {
            servers.push(turn.mint());
        }
        servers
    }
}
