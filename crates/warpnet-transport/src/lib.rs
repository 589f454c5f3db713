//! Transport abstraction layer for warpnet.
//!
//! Provides the [`Transport`] trait that the client and server connection
//! state machines are written against, plus two backings:
//!
//! - [`LoopbackTransport`]: in-process FIFO queues keyed by
//!   [`PeerIdentity`], for tests and single-process play.
//! - `WebSocketTransport` (feature `websocket`): real sockets via
//!   `tokio-tungstenite`.
//!
//! # Polled, not async
//!
//! Game loops call into the network once per tick and must never block.
//! Every [`Transport`] method therefore returns immediately. Connection
//! establishment and closure are reported later through
//! [`Transport::poll_events`], and inbound data is drained with
//! [`Transport::receive`]. The WebSocket backing does its socket I/O on
//! Tokio tasks and only exchanges channel messages with the polling side.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
mod loopback;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use loopback::{LoopbackNet, LoopbackTransport};
#[cfg(feature = "websocket")]
pub use websocket::{PeerDirectory, WebSocketTransport};

use std::fmt;

use bytes::Bytes;
use warpnet_protocol::{DisconnectReason, PeerIdentity};

/// First close code of the application range. A connection closed for a
/// [`DisconnectReason`] carries `CLOSE_CODE_BASE + reason.offset()`.
pub const CLOSE_CODE_BASE: u16 = 4000;

/// The close code a real transport sends for `reason`.
pub fn close_code(reason: DisconnectReason) -> u16 {
    CLOSE_CODE_BASE + reason.offset()
}

/// Maps a received close code back to its reason, if it is one of ours.
pub fn reason_from_close_code(code: u16) -> Option<DisconnectReason> {
    code.checked_sub(CLOSE_CODE_BASE)
        .and_then(DisconnectReason::from_offset)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Transport-assigned identifier for one real connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    /// Creates a new `ConnectionHandle` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Names one remote endpoint, whichever backing is in use.
///
/// The loopback backing keys endpoints by identity; the real backing
/// hands out a handle per connection. State machines treat both as
/// opaque map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionToken {
    Identity(PeerIdentity),
    Handle(ConnectionHandle),
}

impl ConnectionToken {
    /// The peer identity, if the token itself carries one.
    pub fn identity(&self) -> Option<PeerIdentity> {
        match self {
            Self::Identity(id) => Some(*id),
            Self::Handle(_) => None,
        }
    }
}

impl fmt::Display for ConnectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(id) => write!(f, "{id}"),
            Self::Handle(handle) => write!(f, "{handle}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Events and data
// ---------------------------------------------------------------------------

/// Delivery guarantee requested for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendReliability {
    /// Delivered eventually and in order with other reliable sends.
    Reliable,
    /// May be dropped. Backings without an unreliable channel send
    /// these reliably.
    Unreliable,
}

/// Lifecycle state of one connection as the transport sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    None,
    Connecting,
    Connected,
    ClosedByPeer,
    ProblemDetectedLocally,
}

impl ConnectionState {
    /// Returns `true` for the two states that end a connection.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::ClosedByPeer | Self::ProblemDetectedLocally)
    }
}

/// Something that happened to a connection since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A remote peer opened a connection to this listening transport.
    Incoming { token: ConnectionToken },
    /// A known connection moved between states.
    StatusChanged {
        token: ConnectionToken,
        old: ConnectionState,
        new: ConnectionState,
        /// The peer's close code, when the backing carries one.
        end_reason: Option<u16>,
        detail: String,
    },
}

impl TransportEvent {
    /// The connection the event is about.
    pub fn token(&self) -> ConnectionToken {
        match self {
            Self::Incoming { token } | Self::StatusChanged { token, .. } => *token,
        }
    }
}

/// One inbound message and the connection it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub from: ConnectionToken,
    pub data: Bytes,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A non-blocking, connection-oriented message transport.
///
/// Implementations are driven from a single thread: every method returns
/// without waiting on the network. Both backings are used through this
/// trait only, so the client and server behave the same on either.
pub trait Transport {
    /// Starts accepting connections as `local`.
    fn listen(&mut self, local: PeerIdentity) -> Result<(), TransportError>;

    /// Starts connecting to `remote`. Completion (or failure) is reported
    /// by later events and inbound data, never by this call.
    fn connect(&mut self, remote: PeerIdentity) -> Result<ConnectionToken, TransportError>;

    /// Queues `data` for delivery on `to`.
    fn send(
        &mut self,
        to: ConnectionToken,
        data: &[u8],
        reliability: SendReliability,
    ) -> Result<(), TransportError>;

    /// Drains up to `max` inbound messages across every connection.
    ///
    /// Messages a peer sent before closing stay readable after the close
    /// is reported, so a caller that drains data before events sees a
    /// peer's last words before its departure.
    fn receive(&mut self, max: usize) -> Vec<Datagram>;

    /// Drains connection lifecycle events.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// Closes `token`, telling the peer why when the backing can.
    ///
    /// Closing an unknown or already-closed token is a no-op. Once closed
    /// locally, no further events or data are reported for the token,
    /// including any already queued.
    fn close(&mut self, token: ConnectionToken, reason: DisconnectReason, detail: &str);

    /// Stops listening and closes every remaining connection.
    fn shutdown(&mut self);
}
