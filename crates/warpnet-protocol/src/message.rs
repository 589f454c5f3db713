//! In-memory form of every message that travels between client and server.
//!
//! The byte layout of each message lives in [`codec`](crate::codec); this
//! module only defines the values. Fixed-size arrays are always full
//! length on the wire, so the structs here use arrays (not `Vec`) for
//! anything per-slot or per-beam.

use crate::types::{GameState, PeerIdentity, MAX_PHOTON_BEAMS, MAX_PLAYERS};

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// The 4-byte tag at the front of every message.
///
/// Values are stable across client and server builds. Server messages
/// live below 500, client messages from 500, relayed peer messages from
/// 600.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    ServerSendInfo,
    ServerFailAuthentication,
    ServerPassAuthentication,
    ServerUpdateWorld,
    ServerExiting,
    ClientBeginAuthentication,
    ClientSendLocalUpdate,
    P2PSendingTicket,
    VoiceChatData,
}

impl MessageType {
    pub fn tag(self) -> u32 {
        match self {
            Self::ServerSendInfo => 1,
            Self::ServerFailAuthentication => 2,
            Self::ServerPassAuthentication => 3,
            Self::ServerUpdateWorld => 4,
            Self::ServerExiting => 5,
            Self::ClientBeginAuthentication => 502,
            Self::ClientSendLocalUpdate => 503,
            Self::P2PSendingTicket => 601,
            Self::VoiceChatData => 702,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            1 => Self::ServerSendInfo,
            2 => Self::ServerFailAuthentication,
            3 => Self::ServerPassAuthentication,
            4 => Self::ServerUpdateWorld,
            5 => Self::ServerExiting,
            502 => Self::ClientBeginAuthentication,
            503 => Self::ClientSendLocalUpdate,
            601 => Self::P2PSendingTicket,
            702 => Self::VoiceChatData,
            _ => return None,
        })
    }

    /// Returns `true` for messages only a server may send.
    pub fn is_server_message(self) -> bool {
        matches!(
            self,
            Self::ServerSendInfo
                | Self::ServerFailAuthentication
                | Self::ServerPassAuthentication
                | Self::ServerUpdateWorld
                | Self::ServerExiting
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ServerSendInfo => "ServerSendInfo",
            Self::ServerFailAuthentication => "ServerFailAuthentication",
            Self::ServerPassAuthentication => "ServerPassAuthentication",
            Self::ServerUpdateWorld => "ServerUpdateWorld",
            Self::ServerExiting => "ServerExiting",
            Self::ClientBeginAuthentication => "ClientBeginAuthentication",
            Self::ClientSendLocalUpdate => "ClientSendLocalUpdate",
            Self::P2PSendingTicket => "P2PSendingTicket",
            Self::VoiceChatData => "VoiceChatData",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Sent by the server as soon as a connection is established. Tells the
/// client who the server is, so it can start authenticating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSendInfo {
    pub server_identity: PeerIdentity,
    /// Whether the server enforces platform anti-cheat.
    pub secure: bool,
    pub server_name: String,
}

/// Sent by the server once authentication succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPassAuthentication {
    /// The player slot the client now owns.
    pub slot: u32,
}

/// One photon beam's state inside a [`ShipUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhotonBeam {
    pub active: bool,
    pub x_position: f32,
    pub y_position: f32,
    pub x_velocity: f32,
    pub y_velocity: f32,
    pub rotation: f32,
}

/// Per-ship state broadcast by the server every world update.
///
/// Positions are normalized to the viewport (0.0–1.0) so clients with
/// different window sizes agree.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShipUpdate {
    pub disabled: bool,
    pub exploding: bool,
    pub x_acceleration: f32,
    pub y_acceleration: f32,
    pub x_position: f32,
    pub y_position: f32,
    pub x_velocity: f32,
    pub y_velocity: f32,
    pub rotation: f32,
    pub rotation_delta: f32,
    pub forward_thrusters: bool,
    pub reverse_thrusters: bool,
    pub decoration: i32,
    pub weapon: i32,
    pub power: i32,
    pub shield_strength: i32,
    pub photon_beams: [PhotonBeam; MAX_PHOTON_BEAMS],
}

/// The authoritative world snapshot.
///
/// Every per-slot array is `MAX_PLAYERS` long. Inactive slots carry
/// zeroed fields and no identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerUpdateWorld {
    pub game_state: GameState,
    /// Only meaningful when `game_state` is [`GameState::Winner`].
    pub winner_slot: u32,
    pub players_active: [bool; MAX_PLAYERS],
    pub player_scores: [u32; MAX_PLAYERS],
    pub ships: [ShipUpdate; MAX_PLAYERS],
    /// `None` travels as 0, so `Some(PeerIdentity(0))` reads back as `None`.
    pub player_identities: [Option<PeerIdentity>; MAX_PLAYERS],
}

impl ServerUpdateWorld {
    /// An update with every slot inactive.
    pub fn new(game_state: GameState, winner_slot: u32) -> Self {
        Self {
            game_state,
            winner_slot,
            ..Self::default()
        }
    }

    /// Marks `slot` active with the given player data.
    ///
    /// # Panics
    /// If `slot >= MAX_PLAYERS`, or if `identity` is the reserved 0, which
    /// the wire reads back as "no identity".
    pub fn set_player(
        &mut self,
        slot: usize,
        identity: PeerIdentity,
        score: u32,
        ship: ShipUpdate,
    ) {
        assert!(identity.is_valid(), "slot {slot} given the reserved identity 0");
        self.players_active[slot] = true;
        self.player_identities[slot] = Some(identity);
        self.player_scores[slot] = score;
        self.ships[slot] = ship;
    }

    /// Number of slots flagged active.
    pub fn active_count(&self) -> usize {
        self.players_active.iter().filter(|a| **a).count()
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Sent by the client after it learns the server's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientBeginAuthentication {
    /// Opaque platform authentication ticket, at most `MAX_TOKEN_LEN`.
    pub ticket: Vec<u8>,
    /// The identity the client claims; `None` travels as 0.
    pub sender: Option<PeerIdentity>,
}

/// The local player's per-frame input and loadout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientUpdate {
    pub turn_left: bool,
    pub turn_right: bool,
    pub forward_thrust: bool,
    pub reverse_thrust: bool,
    pub fire: bool,
    pub decoration: i32,
    pub weapon: i32,
    pub power: i32,
    pub shield_strength: i32,
    pub player_name: String,
}

/// Sent by the client at its update rate once it is playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSendLocalUpdate {
    pub slot: u32,
    pub update: ClientUpdate,
}

// ---------------------------------------------------------------------------
// Peer → peer (relayed by the server)
// ---------------------------------------------------------------------------

/// A peer-to-peer auth ticket relayed through the server.
///
/// On the way in, `identity` names the intended recipient; the server
/// rewrites it to the sender before forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2PSendingTicket {
    pub identity: PeerIdentity,
    pub ticket: Vec<u8>,
}

/// Compressed voice data relayed to every other player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChatData {
    /// Stamped by the server with the real sender before relaying.
    pub sender: PeerIdentity,
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Any message in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ServerSendInfo(ServerSendInfo),
    ServerFailAuthentication,
    ServerPassAuthentication(ServerPassAuthentication),
    ServerUpdateWorld(Box<ServerUpdateWorld>),
    ServerExiting,
    ClientBeginAuthentication(ClientBeginAuthentication),
    ClientSendLocalUpdate(ClientSendLocalUpdate),
    P2PSendingTicket(P2PSendingTicket),
    VoiceChatData(VoiceChatData),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ServerSendInfo(_) => MessageType::ServerSendInfo,
            Self::ServerFailAuthentication => MessageType::ServerFailAuthentication,
            Self::ServerPassAuthentication(_) => MessageType::ServerPassAuthentication,
            Self::ServerUpdateWorld(_) => MessageType::ServerUpdateWorld,
            Self::ServerExiting => MessageType::ServerExiting,
            Self::ClientBeginAuthentication(_) => MessageType::ClientBeginAuthentication,
            Self::ClientSendLocalUpdate(_) => MessageType::ClientSendLocalUpdate,
            Self::P2PSendingTicket(_) => MessageType::P2PSendingTicket,
            Self::VoiceChatData(_) => MessageType::VoiceChatData,
        }
    }
}

impl From<ServerUpdateWorld> for Message {
    fn from(update: ServerUpdateWorld) -> Self {
        Self::ServerUpdateWorld(Box::new(update))
    }
}
