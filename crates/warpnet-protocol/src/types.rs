//! Identity, slot and disconnect-reason vocabulary shared by both ends.

use std::fmt;

// ---------------------------------------------------------------------------
// Sizing constants
// ---------------------------------------------------------------------------

/// Number of player slots a server offers. Every per-player array on the
/// wire has exactly this many entries, used or not.
pub const MAX_PLAYERS: usize = 4;

/// Bytes reserved for the server name, including the terminating NUL.
pub const MAX_SERVER_NAME: usize = 128;

/// Capacity of an authentication ticket field.
pub const MAX_TOKEN_LEN: usize = 1024;

/// Photon beams a single ship can have in flight.
pub const MAX_PHOTON_BEAMS: usize = 7;

/// Bytes reserved for a player's display name, including the NUL.
pub const MAX_PLAYER_NAME: usize = 64;

/// Largest voice payload accepted in one `VoiceChatData` message.
pub const MAX_VOICE_PAYLOAD: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// PeerIdentity
// ---------------------------------------------------------------------------

/// The stable platform identity of a player or server.
///
/// This is a newtype over the platform's 64-bit account id. The value 0
/// never names a real peer; the wire format uses it for "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerIdentity(pub u64);

impl PeerIdentity {
    /// Returns `true` unless this is the reserved "no identity" value.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Maps the wire encoding (0 = absent) to an `Option`.
    pub fn from_wire(raw: u64) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DisconnectReason
// ---------------------------------------------------------------------------

/// Why a connection ended.
///
/// Each reason maps to a small offset. The real transport adds the offset
/// to the start of its application close-code range, so the remote side's
/// status-change event can tell the categories apart without parsing the
/// free-text debug string that travels alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The client chose to leave.
    ClientDisconnect,
    /// The server is shutting down.
    ServerClosed,
    /// The server refused the client's authentication.
    ServerRejectedAuth,
    /// No slot was available for the client.
    ServerFull,
    /// The server removed the client (timeout or explicit kick).
    PeerKicked,
}

impl DisconnectReason {
    /// All reasons, in offset order.
    pub const ALL: [DisconnectReason; 5] = [
        Self::ClientDisconnect,
        Self::ServerClosed,
        Self::ServerRejectedAuth,
        Self::ServerFull,
        Self::PeerKicked,
    ];

    /// Offset of this reason above the transport's application range.
    pub fn offset(self) -> u16 {
        match self {
            Self::ClientDisconnect => 1,
            Self::ServerClosed => 2,
            Self::ServerRejectedAuth => 3,
            Self::ServerFull => 4,
            Self::PeerKicked => 5,
        }
    }

    /// Inverse of [`offset`](Self::offset).
    pub fn from_offset(offset: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.offset() == offset)
    }

    /// Human-readable text for a connection that ended for this reason,
    /// as seen from the client.
    pub fn describe(self) -> &'static str {
        match self {
            Self::ClientDisconnect => "Disconnected by client.",
            Self::ServerClosed => "Server has closed the connection.",
            Self::ServerRejectedAuth => "Server rejected authentication.",
            Self::ServerFull => "Server is full.",
            Self::PeerKicked => "Kicked from server.",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ClientDisconnect => "client-disconnect",
            Self::ServerClosed => "server-closed",
            Self::ServerRejectedAuth => "server-rejected-auth",
            Self::ServerFull => "server-full",
            Self::PeerKicked => "peer-kicked",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// Server-side round state carried in every world update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameState {
    #[default]
    WaitingForPlayers,
    Active,
    Draw,
    Winner,
    Exiting,
}

impl GameState {
    pub fn to_wire(self) -> u32 {
        match self {
            Self::WaitingForPlayers => 0,
            Self::Active => 1,
            Self::Draw => 2,
            Self::Winner => 3,
            Self::Exiting => 4,
        }
    }

    pub fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::WaitingForPlayers),
            1 => Some(Self::Active),
            2 => Some(Self::Draw),
            3 => Some(Self::Winner),
            4 => Some(Self::Exiting),
            _ => None,
        }
    }
}
