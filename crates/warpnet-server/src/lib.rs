//! Server side of a warpnet game connection.
//!
//! [`ServerConnection`] accepts client connections, runs each one through
//! the authentication handshake and tracks it until it leaves:
//!
//! ```text
//!   connect ──→ Pending ──→ AuthInProgress ──→ Connected
//!                  │               │               │
//!                  └──── full / rejected / timeout / closed ──→ removed
//! ```
//!
//! The server talks to three collaborators, all injected:
//!
//! - a [`Transport`](warpnet_transport::Transport) for bytes,
//! - a [`ServerAuth`] for ticket validation,
//! - a [`SessionRegistry`] for admission and slots ([`SlotTable`] is the
//!   stock one).
//!
//! Nothing here blocks or spawns. The game calls
//! [`poll`](ServerConnection::poll) and
//! [`test_client_liveness_timeouts`](ServerConnection::test_client_liveness_timeouts)
//! every tick.

mod auth;
mod config;
mod connection;
mod error;
mod session;
mod slots;

pub use auth::{AuthRejection, AuthSessionResult, ServerAuth};
pub use config::ServerConfig;
pub use connection::{InboundMessage, ServerConnection};
pub use error::ServerError;
pub use session::{ClientSession, SessionState};
pub use slots::{SessionRegistry, SlotOccupant, SlotTable};
