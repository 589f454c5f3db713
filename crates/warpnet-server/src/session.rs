//! The server's record of one client connection.

use std::time::Instant;

use warpnet_protocol::PeerIdentity;
use warpnet_transport::ConnectionToken;

/// Where a client is in the authentication handshake.
///
/// ```text
///   Pending ──(ClientBeginAuthentication)──→ AuthInProgress ──(verdict ok)──→ Connected
///      │                                          │                              │
///      └─────────────────────── disconnect ───────┴──────────────────────────────┘
/// ```
///
/// Only `Connected` sessions may send game traffic or receive world
/// updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted and sent `ServerSendInfo`; waiting for a ticket.
    Pending,
    /// Ticket submitted to the auth service; waiting for its verdict.
    AuthInProgress,
    /// Authenticated and holding a player slot.
    Connected,
}

/// One client connection as the server sees it.
#[derive(Debug, Clone)]
pub struct ClientSession {
    pub(crate) token: ConnectionToken,
    pub(crate) state: SessionState,
    pub(crate) identity: Option<PeerIdentity>,
    pub(crate) last_activity: Instant,
    pub(crate) slot: Option<u32>,
}

impl ClientSession {
    pub(crate) fn new(token: ConnectionToken, now: Instant) -> Self {
        Self {
            token,
            state: SessionState::Pending,
            identity: None,
            last_activity: now,
            slot: None,
        }
    }

    pub fn token(&self) -> ConnectionToken {
        self.token
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The platform identity, recorded once the client submits a ticket.
    pub fn identity(&self) -> Option<PeerIdentity> {
        self.identity
    }

    /// When the client last sent anything (or connected).
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// The player slot, once `Connected`.
    pub fn slot(&self) -> Option<u32> {
        self.slot
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }
}
