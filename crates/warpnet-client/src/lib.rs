//! Client side of a warpnet game connection.
//!
//! [`ClientConnection`] drives one client from "not connected" through
//! server lookup, transport connect and authentication into play, and
//! back out again on any failure. It is polled by the game loop and
//! never blocks.
//!
//! Platform services are injected as traits:
//!
//! - [`ClientAuth`] issues and cancels authentication tickets.
//! - [`ServerPinger`] resolves a server address to its identity when
//!   connecting by IP. [`NullPinger`] serves identity-only clients.

mod auth;
mod config;
mod connection;
mod error;
mod ping;

pub use auth::{ClientAuth, TicketHandle};
pub use config::ClientConfig;
pub use connection::{ClientConnection, ClientState, MessageDisposition, ServerInfo};
pub use error::ClientError;
pub use ping::{NullPinger, PingGeneration, PingResult, ServerPinger};
