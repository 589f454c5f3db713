//! # warpnet
//!
//! Network protocol and connection lifecycle for small multiplayer games.
//!
//! A game embeds one [`ClientConnection`](warpnet_client::ClientConnection)
//! per player process and one
//! [`ServerConnection`](warpnet_server::ServerConnection) in the host.
//! Both are polled from the game loop, speak the fixed-layout binary
//! protocol in [`protocol`], and run over any [`Transport`](warpnet_transport::Transport):
//! the in-process loopback for tests, or WebSockets for real play.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Instant;
//!
//! use warpnet::prelude::*;
//!
//! # struct Platform;
//! # impl ServerAuth for Platform {
//! #     fn secure(&self) -> bool { false }
//! #     fn begin_auth_session(&mut self, _: &[u8], _: PeerIdentity) -> Result<(), AuthRejection> { Ok(()) }
//! #     fn end_auth_session(&mut self, _: PeerIdentity) {}
//! #     fn poll_results(&mut self) -> Vec<AuthSessionResult> { Vec::new() }
//! # }
//! # fn main() -> Result<(), WarpnetError> {
//! let net = LoopbackNet::new();
//! let mut server = ServerConnection::new(
//!     ServerConfig::default(),
//!     LoopbackTransport::new(net.clone()),
//!     Platform,
//!     SlotTable::new(MAX_PLAYERS),
//! )?;
//! server.set_identity(PeerIdentity(1000))?;
//!
//! // Once per tick:
//! let now = Instant::now();
//! for inbound in server.poll(now) {
//!     // hand inbound.message to the game
//!     let _ = inbound;
//! }
//! server.test_client_liveness_timeouts(now);
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::WarpnetError;

pub use warpnet_client as client;
pub use warpnet_protocol as protocol;
pub use warpnet_server as server;
pub use warpnet_transport as transport;

/// Everything a game needs to host or join.
pub mod prelude {
    pub use crate::WarpnetError;
    pub use warpnet_client::{
        ClientAuth, ClientConfig, ClientConnection, ClientState, NullPinger, PingGeneration,
        PingResult, ServerPinger, TicketHandle,
    };
    pub use warpnet_protocol::{
        ClientSendLocalUpdate, ClientUpdate, DisconnectReason, GameState, MAX_PLAYERS, Message,
        P2PSendingTicket, PeerIdentity, ServerUpdateWorld, ShipUpdate, VoiceChatData,
    };
    pub use warpnet_server::{
        AuthRejection, AuthSessionResult, InboundMessage, ServerAuth, ServerConfig,
        ServerConnection, SessionRegistry, SessionState, SlotTable,
    };
    pub use warpnet_transport::{
        ConnectionToken, LoopbackNet, LoopbackTransport, SendReliability, Transport,
    };
    #[cfg(feature = "websocket")]
    pub use warpnet_transport::{PeerDirectory, WebSocketTransport};
}
