//! Big-endian, fixed-layout encoding for [`Message`].
//!
//! Every message starts with a 4-byte big-endian type tag. After the tag,
//! each message has a fixed layout: fixed-size arrays are always written
//! at full length (zero/false filled), strings occupy a NUL-terminated
//! fixed-width field, and tokens carry a length prefix followed by the
//! full-capacity byte array. Only `VoiceChatData` has a variable length.
//!
//! Decoding is strict. A buffer whose length does not match the layout,
//! a boolean byte other than 0 or 1, a length prefix larger than its
//! field, or an unknown enum value is a [`ProtocolError`]. Encoding never
//! truncates: a value that does not fit its field is rejected.
//!
//! ```rust
//! use warpnet_protocol::{Message, ServerPassAuthentication};
//!
//! let msg = Message::ServerPassAuthentication(ServerPassAuthentication { slot: 2 });
//! let bytes = msg.encode().unwrap();
//! assert_eq!(&bytes[..], &[0, 0, 0, 3, 0, 0, 0, 2]);
//! assert_eq!(Message::decode(&bytes).unwrap(), msg);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::message::{
    ClientBeginAuthentication, ClientSendLocalUpdate, ClientUpdate, Message,
    MessageType, P2PSendingTicket, PhotonBeam, ServerPassAuthentication,
    ServerSendInfo, ServerUpdateWorld, ShipUpdate, VoiceChatData,
};
use crate::types::{
    GameState, PeerIdentity, MAX_PHOTON_BEAMS, MAX_PLAYERS, MAX_PLAYER_NAME,
    MAX_SERVER_NAME, MAX_TOKEN_LEN, MAX_VOICE_PAYLOAD,
};
use crate::ProtocolError;

/// Size of the message-type tag that prefixes every message.
pub const TAG_SIZE: usize = 4;

/// Fixed part of a `VoiceChatData` message: tag, length, sender.
pub const VOICE_HEADER_SIZE: usize = TAG_SIZE + 4 + 8;

const PHOTON_BEAM_SIZE: usize = 1 + 5 * 4;
const SHIP_UPDATE_SIZE: usize =
    2 + 8 * 4 + 2 + 4 * 4 + MAX_PHOTON_BEAMS * PHOTON_BEAM_SIZE;
const CLIENT_UPDATE_SIZE: usize = 5 + 4 * 4 + MAX_PLAYER_NAME;
const TOKEN_FIELD_SIZE: usize = 4 + MAX_TOKEN_LEN;

/// Total encoded size (tag included) of a fixed-layout message type, or
/// `None` for `VoiceChatData`, whose size depends on its payload.
pub fn wire_size(ty: MessageType) -> Option<usize> {
    let body = match ty {
        MessageType::ServerSendInfo => 8 + 1 + MAX_SERVER_NAME,
        MessageType::ServerFailAuthentication | MessageType::ServerExiting => 0,
        MessageType::ServerPassAuthentication => 4,
        MessageType::ServerUpdateWorld => {
            4 + 4 + MAX_PLAYERS + MAX_PLAYERS * 4 + MAX_PLAYERS * SHIP_UPDATE_SIZE + MAX_PLAYERS * 8
        }
        MessageType::ClientBeginAuthentication | MessageType::P2PSendingTicket => {
            TOKEN_FIELD_SIZE + 8
        }
        MessageType::ClientSendLocalUpdate => 4 + CLIENT_UPDATE_SIZE,
        MessageType::VoiceChatData => return None,
    };
    Some(TAG_SIZE + body)
}

/// Reads the message-type tag without decoding the rest.
///
/// # Errors
/// `MissingTag` if fewer than four bytes are present, `UnknownType` if
/// the tag is not in the catalog.
pub fn peek_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.len() < TAG_SIZE {
        return Err(ProtocolError::MissingTag(data.len()));
    }
    let tag = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    MessageType::from_tag(tag).ok_or(ProtocolError::UnknownType(tag))
}

impl Message {
    /// Encodes this message into its exact wire representation.
    ///
    /// # Errors
    /// `FieldTooLong` if a string, token or payload does not fit its
    /// field; `InvalidString` if a string contains a NUL byte.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let ty = self.message_type();
        let capacity = match self {
            Message::VoiceChatData(voice) => VOICE_HEADER_SIZE + voice.payload.len(),
            _ => wire_size(ty).unwrap_or(TAG_SIZE),
        };
        let mut buf = BytesMut::with_capacity(capacity);
        buf.put_u32(ty.tag());

        match self {
            Message::ServerSendInfo(info) => {
                buf.put_u64(info.server_identity.0);
                put_bool(&mut buf, info.secure);
                put_cstr(&mut buf, "server_name", &info.server_name, MAX_SERVER_NAME)?;
            }
            Message::ServerFailAuthentication | Message::ServerExiting => {}
            Message::ServerPassAuthentication(pass) => buf.put_u32(pass.slot),
            Message::ServerUpdateWorld(update) => put_world(&mut buf, update),
            Message::ClientBeginAuthentication(auth) => {
                put_token(&mut buf, "ticket", &auth.ticket)?;
                buf.put_u64(auth.sender.map_or(0, |id| id.0));
            }
            Message::ClientSendLocalUpdate(local) => {
                buf.put_u32(local.slot);
                put_client_update(&mut buf, &local.update)?;
            }
            Message::P2PSendingTicket(p2p) => {
                put_token(&mut buf, "ticket", &p2p.ticket)?;
                buf.put_u64(p2p.identity.0);
            }
            Message::VoiceChatData(voice) => {
                if voice.payload.len() > MAX_VOICE_PAYLOAD {
                    return Err(ProtocolError::FieldTooLong {
                        field: "voice payload",
                        len: voice.payload.len(),
                        max: MAX_VOICE_PAYLOAD,
                    });
                }
                buf.put_u32(voice.payload.len() as u32);
                buf.put_u64(voice.sender.0);
                buf.put_slice(&voice.payload);
            }
        }

        debug_assert_eq!(buf.len(), capacity, "{ty} encoded to the wrong size");
        Ok(buf.freeze())
    }

    /// Decodes one complete message from `data`.
    ///
    /// # Errors
    /// Any [`ProtocolError`] other than `FieldTooLong`: the buffer must
    /// be exactly one well-formed message.
    pub fn decode(data: &[u8]) -> Result<Message, ProtocolError> {
        let ty = peek_type(data)?;

        match wire_size(ty) {
            Some(expected) if expected != data.len() => {
                return Err(ProtocolError::SizeMismatch {
                    message: ty.name(),
                    expected,
                    actual: data.len(),
                });
            }
            _ => {}
        }

        let mut buf = &data[TAG_SIZE..];
        let msg = match ty {
            MessageType::ServerSendInfo => Message::ServerSendInfo(ServerSendInfo {
                server_identity: PeerIdentity(buf.get_u64()),
                secure: get_bool(&mut buf, "secure")?,
                server_name: get_cstr(&mut buf, "server_name", MAX_SERVER_NAME)?,
            }),
            MessageType::ServerFailAuthentication => Message::ServerFailAuthentication,
            MessageType::ServerPassAuthentication => {
                Message::ServerPassAuthentication(ServerPassAuthentication {
                    slot: buf.get_u32(),
                })
            }
            MessageType::ServerUpdateWorld => get_world(&mut buf)?.into(),
            MessageType::ServerExiting => Message::ServerExiting,
            MessageType::ClientBeginAuthentication => {
                Message::ClientBeginAuthentication(ClientBeginAuthentication {
                    ticket: get_token(&mut buf, "ticket")?,
                    sender: PeerIdentity::from_wire(buf.get_u64()),
                })
            }
            MessageType::ClientSendLocalUpdate => {
                Message::ClientSendLocalUpdate(ClientSendLocalUpdate {
                    slot: buf.get_u32(),
                    update: get_client_update(&mut buf)?,
                })
            }
            MessageType::P2PSendingTicket => Message::P2PSendingTicket(P2PSendingTicket {
                ticket: get_token(&mut buf, "ticket")?,
                identity: PeerIdentity(buf.get_u64()),
            }),
            MessageType::VoiceChatData => get_voice(data)?,
        };

        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// Primitive fields
// ---------------------------------------------------------------------------

fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

fn get_bool(buf: &mut &[u8], field: &'static str) -> Result<bool, ProtocolError> {
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(ProtocolError::InvalidBool { field, value }),
    }
}

/// Writes `s` into a `width`-byte field, NUL terminated and zero padded.
fn put_cstr(
    buf: &mut BytesMut,
    field: &'static str,
    s: &str,
    width: usize,
) -> Result<(), ProtocolError> {
    let raw = s.as_bytes();
    if raw.contains(&0) {
        return Err(ProtocolError::InvalidString(field));
    }
    // One byte is always reserved for the terminator.
    if raw.len() >= width {
        return Err(ProtocolError::FieldTooLong {
            field,
            len: raw.len(),
            max: width - 1,
        });
    }
    buf.put_slice(raw);
    buf.put_bytes(0, width - raw.len());
    Ok(())
}

fn get_cstr(
    buf: &mut &[u8],
    field: &'static str,
    width: usize,
) -> Result<String, ProtocolError> {
    let raw = &buf[..width];
    let end = raw
        .iter()
        .position(|b| *b == 0)
        .ok_or(ProtocolError::InvalidString(field))?;
    let s = std::str::from_utf8(&raw[..end])
        .map_err(|_| ProtocolError::InvalidString(field))?
        .to_owned();
    buf.advance(width);
    Ok(s)
}

/// Length prefix plus a full `MAX_TOKEN_LEN` array.
fn put_token(
    buf: &mut BytesMut,
    field: &'static str,
    token: &[u8],
) -> Result<(), ProtocolError> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(ProtocolError::FieldTooLong {
            field,
            len: token.len(),
            max: MAX_TOKEN_LEN,
        });
    }
    buf.put_u32(token.len() as u32);
    buf.put_slice(token);
    buf.put_bytes(0, MAX_TOKEN_LEN - token.len());
    Ok(())
}

fn get_token(buf: &mut &[u8], field: &'static str) -> Result<Vec<u8>, ProtocolError> {
    let len = buf.get_u32() as usize;
    if len > MAX_TOKEN_LEN {
        return Err(ProtocolError::LengthOutOfRange {
            field,
            len,
            max: MAX_TOKEN_LEN,
        });
    }
    let token = buf[..len].to_vec();
    buf.advance(MAX_TOKEN_LEN);
    Ok(token)
}

// ---------------------------------------------------------------------------
// Composite structs
// ---------------------------------------------------------------------------

fn put_photon_beam(buf: &mut BytesMut, beam: &PhotonBeam) {
    put_bool(buf, beam.active);
    buf.put_f32(beam.x_position);
    buf.put_f32(beam.y_position);
    buf.put_f32(beam.x_velocity);
    buf.put_f32(beam.y_velocity);
    buf.put_f32(beam.rotation);
}

fn get_photon_beam(buf: &mut &[u8]) -> Result<PhotonBeam, ProtocolError> {
    Ok(PhotonBeam {
        active: get_bool(buf, "photon_beam.active")?,
        x_position: buf.get_f32(),
        y_position: buf.get_f32(),
        x_velocity: buf.get_f32(),
        y_velocity: buf.get_f32(),
        rotation: buf.get_f32(),
    })
}

fn put_ship(buf: &mut BytesMut, ship: &ShipUpdate) {
    put_bool(buf, ship.disabled);
    put_bool(buf, ship.exploding);
    buf.put_f32(ship.x_acceleration);
    buf.put_f32(ship.y_acceleration);
    buf.put_f32(ship.x_position);
    buf.put_f32(ship.y_position);
    buf.put_f32(ship.x_velocity);
    buf.put_f32(ship.y_velocity);
    buf.put_f32(ship.rotation);
    buf.put_f32(ship.rotation_delta);
    put_bool(buf, ship.forward_thrusters);
    put_bool(buf, ship.reverse_thrusters);
    buf.put_i32(ship.decoration);
    buf.put_i32(ship.weapon);
    buf.put_i32(ship.power);
    buf.put_i32(ship.shield_strength);
    for beam in &ship.photon_beams {
        put_photon_beam(buf, beam);
    }
}

fn get_ship(buf: &mut &[u8]) -> Result<ShipUpdate, ProtocolError> {
    let mut ship = ShipUpdate {
        disabled: get_bool(buf, "ship.disabled")?,
        exploding: get_bool(buf, "ship.exploding")?,
        x_acceleration: buf.get_f32(),
        y_acceleration: buf.get_f32(),
        x_position: buf.get_f32(),
        y_position: buf.get_f32(),
        x_velocity: buf.get_f32(),
        y_velocity: buf.get_f32(),
        rotation: buf.get_f32(),
        rotation_delta: buf.get_f32(),
        forward_thrusters: get_bool(buf, "ship.forward_thrusters")?,
        reverse_thrusters: get_bool(buf, "ship.reverse_thrusters")?,
        decoration: buf.get_i32(),
        weapon: buf.get_i32(),
        power: buf.get_i32(),
        shield_strength: buf.get_i32(),
        photon_beams: [PhotonBeam::default(); MAX_PHOTON_BEAMS],
    };
    for beam in &mut ship.photon_beams {
        *beam = get_photon_beam(buf)?;
    }
    Ok(ship)
}

fn put_world(buf: &mut BytesMut, update: &ServerUpdateWorld) {
    buf.put_u32(update.game_state.to_wire());
    buf.put_u32(update.winner_slot);
    for active in update.players_active {
        put_bool(buf, active);
    }
    for score in update.player_scores {
        buf.put_u32(score);
    }
    for ship in &update.ships {
        put_ship(buf, ship);
    }
    for identity in update.player_identities {
        buf.put_u64(identity.map_or(0, |id| id.0));
    }
}

fn get_world(buf: &mut &[u8]) -> Result<ServerUpdateWorld, ProtocolError> {
    let raw_state = buf.get_u32();
    let game_state = GameState::from_wire(raw_state).ok_or(ProtocolError::InvalidEnum {
        field: "game_state",
        value: raw_state,
    })?;
    let mut update = ServerUpdateWorld::new(game_state, buf.get_u32());

    for active in &mut update.players_active {
        *active = get_bool(buf, "players_active")?;
    }
    for score in &mut update.player_scores {
        *score = buf.get_u32();
    }
    for ship in &mut update.ships {
        *ship = get_ship(buf)?;
    }
    for identity in &mut update.player_identities {
        *identity = PeerIdentity::from_wire(buf.get_u64());
    }
    Ok(update)
}

fn put_client_update(buf: &mut BytesMut, update: &ClientUpdate) -> Result<(), ProtocolError> {
    put_bool(buf, update.turn_left);
    put_bool(buf, update.turn_right);
    put_bool(buf, update.forward_thrust);
    put_bool(buf, update.reverse_thrust);
    put_bool(buf, update.fire);
    buf.put_i32(update.decoration);
    buf.put_i32(update.weapon);
    buf.put_i32(update.power);
    buf.put_i32(update.shield_strength);
    put_cstr(buf, "player_name", &update.player_name, MAX_PLAYER_NAME)
}

fn get_client_update(buf: &mut &[u8]) -> Result<ClientUpdate, ProtocolError> {
    Ok(ClientUpdate {
        turn_left: get_bool(buf, "turn_left")?,
        turn_right: get_bool(buf, "turn_right")?,
        forward_thrust: get_bool(buf, "forward_thrust")?,
        reverse_thrust: get_bool(buf, "reverse_thrust")?,
        fire: get_bool(buf, "fire")?,
        decoration: buf.get_i32(),
        weapon: buf.get_i32(),
        power: buf.get_i32(),
        shield_strength: buf.get_i32(),
        player_name: get_cstr(buf, "player_name", MAX_PLAYER_NAME)?,
    })
}

fn get_voice(data: &[u8]) -> Result<Message, ProtocolError> {
    if data.len() < VOICE_HEADER_SIZE {
        return Err(ProtocolError::SizeMismatch {
            message: MessageType::VoiceChatData.name(),
            expected: VOICE_HEADER_SIZE,
            actual: data.len(),
        });
    }
    let mut buf = &data[TAG_SIZE..];
    let len = buf.get_u32() as usize;
    if len > MAX_VOICE_PAYLOAD {
        return Err(ProtocolError::LengthOutOfRange {
            field: "voice payload",
            len,
            max: MAX_VOICE_PAYLOAD,
        });
    }
    if data.len() != VOICE_HEADER_SIZE + len {
        return Err(ProtocolError::SizeMismatch {
            message: MessageType::VoiceChatData.name(),
            expected: VOICE_HEADER_SIZE + len,
            actual: data.len(),
        });
    }
    let sender = PeerIdentity(buf.get_u64());
    Ok(Message::VoiceChatData(VoiceChatData {
        sender,
        payload: buf.to_vec(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ship(seed: f32) -> ShipUpdate {
        let mut ship = ShipUpdate {
            disabled: false,
            exploding: true,
            x_acceleration: seed,
            y_acceleration: -seed,
            x_position: 0.25,
            y_position: 0.75,
            x_velocity: 1.5,
            y_velocity: -2.5,
            rotation: std::f32::consts::PI,
            rotation_delta: 0.01,
            forward_thrusters: true,
            reverse_thrusters: false,
            decoration: 3,
            weapon: -1,
            power: i32::MAX,
            shield_strength: i32::MIN,
            photon_beams: [PhotonBeam::default(); MAX_PHOTON_BEAMS],
        };
        ship.photon_beams[0] = PhotonBeam {
            active: true,
            x_position: 0.5,
            y_position: 0.5,
            x_velocity: 9.0,
            y_velocity: -9.0,
            rotation: 1.0,
        };
        ship.photon_beams[MAX_PHOTON_BEAMS - 1].active = true;
        ship
    }

    fn round_trip(msg: Message) {
        let bytes = msg.encode().expect("encodes");
        if let Some(size) = wire_size(msg.message_type()) {
            assert_eq!(bytes.len(), size, "{}", msg.message_type());
        }
        assert_eq!(Message::decode(&bytes).expect("decodes"), msg);
    }

    // =======================================================================
    // Sizes
    // =======================================================================

    #[test]
    fn test_wire_size_matches_catalog() {
        assert_eq!(wire_size(MessageType::ServerSendInfo), Some(141));
        assert_eq!(wire_size(MessageType::ServerFailAuthentication), Some(4));
        assert_eq!(wire_size(MessageType::ServerPassAuthentication), Some(8));
        assert_eq!(wire_size(MessageType::ServerUpdateWorld), Some(860));
        assert_eq!(wire_size(MessageType::ServerExiting), Some(4));
        assert_eq!(wire_size(MessageType::ClientBeginAuthentication), Some(1040));
        assert_eq!(wire_size(MessageType::ClientSendLocalUpdate), Some(93));
        assert_eq!(wire_size(MessageType::P2PSendingTicket), Some(1040));
        assert_eq!(wire_size(MessageType::VoiceChatData), None);
        assert_eq!(SHIP_UPDATE_SIZE, 199);
        assert_eq!(CLIENT_UPDATE_SIZE, 85);
    }

    // =======================================================================
    // Round trips, including boundary values
    // =======================================================================

    #[test]
    fn test_round_trip_server_send_info_boundaries() {
        round_trip(Message::ServerSendInfo(ServerSendInfo {
            server_identity: PeerIdentity(u64::MAX),
            secure: true,
            server_name: String::new(),
        }));
        round_trip(Message::ServerSendInfo(ServerSendInfo {
            server_identity: PeerIdentity(90071992547409921),
            secure: false,
            server_name: "n".repeat(MAX_SERVER_NAME - 1),
        }));
        round_trip(Message::ServerSendInfo(ServerSendInfo {
            server_identity: PeerIdentity(1),
            secure: false,
            server_name: "Café Ω".into(),
        }));
    }

    #[test]
    fn test_round_trip_tag_only_messages() {
        round_trip(Message::ServerFailAuthentication);
        round_trip(Message::ServerExiting);
        round_trip(Message::ServerPassAuthentication(ServerPassAuthentication {
            slot: 3,
        }));
    }

    #[test]
    fn test_round_trip_client_begin_authentication_boundaries() {
        round_trip(Message::ClientBeginAuthentication(ClientBeginAuthentication {
            ticket: Vec::new(),
            sender: None,
        }));
        round_trip(Message::ClientBeginAuthentication(ClientBeginAuthentication {
            ticket: (0..MAX_TOKEN_LEN).map(|i| (i % 251) as u8).collect(),
            sender: Some(PeerIdentity(42)),
        }));
    }

    #[test]
    fn test_round_trip_client_send_local_update() {
        round_trip(Message::ClientSendLocalUpdate(ClientSendLocalUpdate {
            slot: 1,
            update: ClientUpdate::default(),
        }));
        round_trip(Message::ClientSendLocalUpdate(ClientSendLocalUpdate {
            slot: 3,
            update: ClientUpdate {
                turn_left: true,
                turn_right: false,
                forward_thrust: true,
                reverse_thrust: false,
                fire: true,
                decoration: 2,
                weapon: 1,
                power: -7,
                shield_strength: 100,
                player_name: "p".repeat(MAX_PLAYER_NAME - 1),
            },
        }));
    }

    #[test]
    fn test_round_trip_relayed_messages() {
        round_trip(Message::P2PSendingTicket(P2PSendingTicket {
            identity: PeerIdentity(77),
            ticket: vec![0xAB; MAX_TOKEN_LEN],
        }));
        round_trip(Message::VoiceChatData(VoiceChatData {
            sender: PeerIdentity(0),
            payload: Vec::new(),
        }));
        round_trip(Message::VoiceChatData(VoiceChatData {
            sender: PeerIdentity(5),
            payload: vec![1, 2, 3, 4, 5],
        }));
    }

    #[test]
    fn test_round_trip_world_all_inactive() {
        round_trip(ServerUpdateWorld::new(GameState::WaitingForPlayers, 0).into());
    }

    #[test]
    fn test_decode_world_reports_exactly_n_active_slots() {
        for n in 0..=MAX_PLAYERS {
            let mut update = ServerUpdateWorld::new(GameState::Active, 0);
            for slot in 0..n {
                update.set_player(
                    slot,
                    PeerIdentity(100 + slot as u64),
                    slot as u32 * 10,
                    sample_ship(slot as f32),
                );
            }

            let bytes = Message::from(update.clone()).encode().unwrap();
            let Message::ServerUpdateWorld(decoded) = Message::decode(&bytes).unwrap() else {
                panic!("expected a world update");
            };

            assert_eq!(*decoded, update);
            assert_eq!(decoded.active_count(), n);
            for slot in n..MAX_PLAYERS {
                assert!(!decoded.players_active[slot]);
                assert_eq!(decoded.player_scores[slot], 0);
                assert_eq!(decoded.player_identities[slot], None);
                assert_eq!(decoded.ships[slot], ShipUpdate::default());
            }
        }
    }

    #[test]
    fn test_encode_big_endian_layout() {
        let bytes = Message::ServerSendInfo(ServerSendInfo {
            server_identity: PeerIdentity(0x0102030405060708),
            secure: true,
            server_name: "ab".into(),
        })
        .encode()
        .unwrap();

        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..12], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(bytes[12], 1);
        assert_eq!(&bytes[13..16], b"ab\0");
        assert!(bytes[16..].iter().all(|b| *b == 0));
    }

    // =======================================================================
    // Rejections
    // =======================================================================

    #[test]
    fn test_decode_empty_buffer_is_missing_tag() {
        assert_eq!(Message::decode(&[]), Err(ProtocolError::MissingTag(0)));
        assert_eq!(Message::decode(&[0, 0, 1]), Err(ProtocolError::MissingTag(3)));
    }

    #[test]
    fn test_decode_unknown_tag_is_rejected() {
        assert_eq!(
            Message::decode(&[0, 0, 0, 99]),
            Err(ProtocolError::UnknownType(99))
        );
    }

    #[test]
    fn test_decode_undersized_and_oversized_are_rejected() {
        let bytes = Message::ServerPassAuthentication(ServerPassAuthentication { slot: 1 })
            .encode()
            .unwrap();

        let short = Message::decode(&bytes[..7]);
        assert!(matches!(
            short,
            Err(ProtocolError::SizeMismatch { expected: 8, actual: 7, .. })
        ));

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(matches!(
            Message::decode(&long),
            Err(ProtocolError::SizeMismatch { expected: 8, actual: 9, .. })
        ));
    }

    #[test]
    fn test_decode_invalid_bool_is_rejected() {
        let mut bytes = Message::ServerSendInfo(ServerSendInfo {
            server_identity: PeerIdentity(1),
            secure: false,
            server_name: "x".into(),
        })
        .encode()
        .unwrap()
        .to_vec();
        bytes[12] = 2;

        assert_eq!(
            Message::decode(&bytes),
            Err(ProtocolError::InvalidBool { field: "secure", value: 2 })
        );
    }

    #[test]
    fn test_decode_token_length_over_capacity_is_rejected() {
        let mut bytes = Message::ClientBeginAuthentication(ClientBeginAuthentication {
            ticket: vec![1],
            sender: None,
        })
        .encode()
        .unwrap()
        .to_vec();
        bytes[4..8].copy_from_slice(&(MAX_TOKEN_LEN as u32 + 1).to_be_bytes());

        assert!(matches!(
            Message::decode(&bytes),
            Err(ProtocolError::LengthOutOfRange { len: 1025, .. })
        ));
    }

    #[test]
    fn test_decode_unknown_game_state_is_rejected() {
        let mut bytes = Message::from(ServerUpdateWorld::default()).encode().unwrap().to_vec();
        bytes[4..8].copy_from_slice(&9u32.to_be_bytes());

        assert_eq!(
            Message::decode(&bytes),
            Err(ProtocolError::InvalidEnum { field: "game_state", value: 9 })
        );
    }

    #[test]
    fn test_decode_voice_length_mismatch_is_rejected() {
        let mut bytes = Message::VoiceChatData(VoiceChatData {
            sender: PeerIdentity(1),
            payload: vec![9; 4],
        })
        .encode()
        .unwrap()
        .to_vec();
        bytes.pop();

        assert!(matches!(
            Message::decode(&bytes),
            Err(ProtocolError::SizeMismatch { expected: 20, actual: 19, .. })
        ));
        assert!(matches!(
            Message::decode(&bytes[..10]),
            Err(ProtocolError::SizeMismatch { expected: VOICE_HEADER_SIZE, .. })
        ));
    }

    #[test]
    fn test_encode_oversized_fields_are_rejected() {
        let name = Message::ServerSendInfo(ServerSendInfo {
            server_identity: PeerIdentity(1),
            secure: false,
            server_name: "n".repeat(MAX_SERVER_NAME),
        });
        assert!(matches!(
            name.encode(),
            Err(ProtocolError::FieldTooLong { field: "server_name", .. })
        ));

        let ticket = Message::P2PSendingTicket(P2PSendingTicket {
            identity: PeerIdentity(1),
            ticket: vec![0; MAX_TOKEN_LEN + 1],
        });
        assert!(matches!(ticket.encode(), Err(ProtocolError::FieldTooLong { .. })));

        let voice = Message::VoiceChatData(VoiceChatData {
            sender: PeerIdentity(1),
            payload: vec![0; MAX_VOICE_PAYLOAD + 1],
        });
        assert!(matches!(voice.encode(), Err(ProtocolError::FieldTooLong { .. })));
    }

    #[test]
    fn test_encode_interior_nul_is_rejected() {
        let msg = Message::ServerSendInfo(ServerSendInfo {
            server_identity: PeerIdentity(1),
            secure: false,
            server_name: "a\0b".into(),
        });
        assert_eq!(msg.encode(), Err(ProtocolError::InvalidString("server_name")));
    }

    #[test]
    fn test_peek_type_reads_tag_only() {
        let bytes = Message::ServerExiting.encode().unwrap();
        assert_eq!(peek_type(&bytes), Ok(MessageType::ServerExiting));
        assert_eq!(
            peek_type(&[0, 0, 1, 246, 0xFF]),
            Ok(MessageType::ClientBeginAuthentication)
        );
    }
}
