//! Wire protocol for warpnet.
//!
//! This crate defines the "language" that game clients and servers speak:
//!
//! - **Types** ([`PeerIdentity`], [`DisconnectReason`], [`GameState`] and
//!   the sizing constants) shared by both ends.
//! - **Messages** ([`Message`] and one struct per message kind) that
//!   travel on the wire.
//! - **Codec** ([`Message::encode`], [`Message::decode`], [`peek_type`]),
//!   the fixed-layout big-endian byte format.
//! - **Errors** ([`ProtocolError`]) for buffers that are not valid
//!   messages.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes) and the
//! connection state machines. It knows nothing about connections: it
//! only turns messages into bytes and back.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Client / Server connection
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::{peek_type, wire_size, TAG_SIZE, VOICE_HEADER_SIZE};
pub use error::ProtocolError;
pub use message::{
    ClientBeginAuthentication, ClientSendLocalUpdate, ClientUpdate, Message,
    MessageType, P2PSendingTicket, PhotonBeam, ServerPassAuthentication,
    ServerSendInfo, ServerUpdateWorld, ShipUpdate, VoiceChatData,
};
pub use types::{
    DisconnectReason, GameState, PeerIdentity, MAX_PHOTON_BEAMS, MAX_PLAYERS,
    MAX_PLAYER_NAME, MAX_SERVER_NAME, MAX_TOKEN_LEN, MAX_VOICE_PAYLOAD,
};
