//! End-to-end tests: real client and server state machines talking over
//! the loopback transport, with scripted platform services.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use warpnet::prelude::*;

const SERVER: PeerIdentity = PeerIdentity(1000);

// =========================================================================
// Platform doubles
// =========================================================================

/// Issues the player's id as its ticket.
struct PlayerAuth {
    id: PeerIdentity,
    issued: u32,
    cancelled: Vec<TicketHandle>,
}

impl PlayerAuth {
    fn new(id: u64) -> Self {
        Self {
            id: PeerIdentity(id),
            issued: 0,
            cancelled: Vec::new(),
        }
    }
}

impl ClientAuth for PlayerAuth {
    fn local_identity(&self) -> PeerIdentity {
        self.id
    }

    fn get_auth_ticket(&mut self) -> (Vec<u8>, TicketHandle) {
        self.issued += 1;
        (self.id.0.to_be_bytes().to_vec(), TicketHandle(self.issued))
    }

    fn cancel_auth_ticket(&mut self, handle: TicketHandle) {
        self.cancelled.push(handle);
    }
}

/// Decides every ticket on the poll after it is submitted.
#[derive(Default)]
struct PlatformAuth {
    denied: HashSet<PeerIdentity>,
    queued: Vec<AuthSessionResult>,
    ended: Vec<PeerIdentity>,
}

impl ServerAuth for PlatformAuth {
    fn secure(&self) -> bool {
        true
    }

    fn begin_auth_session(
        &mut self,
        _ticket: &[u8],
        identity: PeerIdentity,
    ) -> Result<(), AuthRejection> {
        let outcome = if self.denied.contains(&identity) {
            Err(AuthRejection("ticket revoked".into()))
        } else {
            Ok(())
        };
        self.queued.push(AuthSessionResult { identity, outcome });
        Ok(())
    }

    fn end_auth_session(&mut self, identity: PeerIdentity) {
        self.ended.push(identity);
    }

    fn poll_results(&mut self) -> Vec<AuthSessionResult> {
        std::mem::take(&mut self.queued)
    }
}

/// A slot table that also counts notifications.
struct Registry {
    slots: SlotTable,
    auth_failed: usize,
    disconnected: usize,
}

impl SessionRegistry for Registry {
    fn can_admit_new_connection(&mut self, token: ConnectionToken) -> bool {
        self.slots.can_admit_new_connection(token)
    }

    fn admit_authenticated_client(
        &mut self,
        token: ConnectionToken,
        identity: PeerIdentity,
    ) -> Option<u32> {
        self.slots.admit_authenticated_client(token, identity)
    }

    fn notify_auth_failed(&mut self, token: ConnectionToken) {
        self.auth_failed += 1;
        self.slots.notify_auth_failed(token);
    }

    fn notify_disconnected(&mut self, token: ConnectionToken) {
        self.disconnected += 1;
        self.slots.notify_disconnected(token);
    }
}

type Server = ServerConnection<LoopbackTransport, PlatformAuth, Registry>;
type Client = ClientConnection<LoopbackTransport, PlayerAuth, NullPinger>;

// =========================================================================
// World
// =========================================================================

/// One server and any number of clients on a shared loopback net, driven
/// by a simulated clock.
struct World {
    net: LoopbackNet,
    server: Server,
    clients: Vec<Client>,
    t0: Instant,
    now: Instant,
}

impl World {
    fn new(max_players: usize, auth: PlatformAuth) -> Self {
        let net = LoopbackNet::new();
        let config = ServerConfig {
            max_players,
            server_name: "e2e arena".into(),
            ..ServerConfig::default()
        };
        let registry = Registry {
            slots: SlotTable::new(max_players),
            auth_failed: 0,
            disconnected: 0,
        };
        let mut server =
            ServerConnection::new(config, LoopbackTransport::new(net.clone()), auth, registry)
                .expect("valid config");
        server.set_identity(SERVER).expect("server should listen");
        let t0 = Instant::now();
        Self {
            net,
            server,
            clients: Vec::new(),
            t0,
            now: t0,
        }
    }

    /// Adds a client with identity `id` and starts its connect.
    fn join(&mut self, id: u64) -> usize {
        let mut client = ClientConnection::new(
            ClientConfig::default(),
            LoopbackTransport::with_identity(self.net.clone(), PeerIdentity(id)),
            PlayerAuth::new(id),
            NullPinger::default(),
        );
        client.connect(SERVER, self.now);
        self.clients.push(client);
        self.clients.len() - 1
    }

    /// Advances the clock by one 10ms tick, polling the server and then
    /// every client. Returns what the server handed to the game.
    fn tick(&mut self) -> Vec<InboundMessage> {
        self.now += Duration::from_millis(10);
        let inbound = self.server.poll(self.now);
        for client in &mut self.clients {
            client.poll(self.now);
        }
        inbound
    }

    fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    fn token_of(id: u64) -> ConnectionToken {
        ConnectionToken::Identity(PeerIdentity(id))
    }
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn test_handshake_success_reaches_connected_in_slot_zero() {
    let mut world = World::new(4, PlatformAuth::default());
    let c = world.join(1);

    world.run(5);

    let client = &world.clients[c];
    assert_eq!(client.state(), ClientState::ConnectedAndAuthenticated);
    assert_eq!(client.slot(), Some(0));
    assert_eq!(client.server_info().unwrap().name, "e2e arena");

    let session = world.server.session(World::token_of(1)).unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.slot(), Some(0));
    assert_eq!(session.identity(), Some(PeerIdentity(1)));
}

#[test]
fn test_handshake_failure_returns_client_to_not_connected() {
    let mut auth = PlatformAuth::default();
    auth.denied.insert(PeerIdentity(1));
    let mut world = World::new(4, auth);
    let c = world.join(1);

    world.run(5);

    let client = &world.clients[c];
    assert_eq!(client.state(), ClientState::NotConnected);
    assert_eq!(client.last_error(), Some("Server rejected authentication."));
    assert_eq!(client.auth().cancelled, vec![TicketHandle(1)]);

    assert!(world.server.session(World::token_of(1)).is_none());
    assert_eq!(world.server.registry().auth_failed, 1);
    assert_eq!(world.server.auth().ended, vec![PeerIdentity(1)]);
}

#[test]
fn test_five_clients_against_four_slots_admits_four() {
    let mut world = World::new(4, PlatformAuth::default());
    for id in 1..=5 {
        world.join(id);
    }

    world.run(6);

    let connected: Vec<_> = world
        .clients
        .iter()
        .filter(|c| c.state() == ClientState::ConnectedAndAuthenticated)
        .collect();
    assert_eq!(connected.len(), 4);
    assert_eq!(world.server.connected_count(), 4);

    let mut slots: Vec<u32> = connected.iter().filter_map(|c| c.slot()).collect();
    slots.sort_unstable();
    assert_eq!(slots, vec![0, 1, 2, 3]);

    let rejected = &world.clients[4];
    assert_eq!(rejected.state(), ClientState::NotConnected);
    assert!(rejected.last_error().is_some());
    assert!(world.server.session(World::token_of(5)).is_none());
    assert_eq!(world.server.session_count(), 4);
    assert_eq!(world.server.registry().slots.pending_count(), 0);
}

#[test]
fn test_freed_slot_is_reused_by_next_client() {
    let mut world = World::new(2, PlatformAuth::default());
    world.join(1);
    world.join(2);
    world.run(5);

    world.clients[0].disconnect("leaving");
    world.run(2);
    assert_eq!(world.server.registry().disconnected, 1);

    let c = world.join(3);
    world.run(5);

    assert_eq!(world.clients[c].state(), ClientState::ConnectedAndAuthenticated);
    assert_eq!(world.clients[c].slot(), Some(0));
}

#[test]
fn test_immediate_reconnect_gets_a_fresh_session() {
    let mut world = World::new(4, PlatformAuth::default());
    world.join(1);
    world.run(5);

    // Leave and rejoin before the server polls again.
    let now = world.now;
    world.clients[0].disconnect("leaving");
    world.clients[0].connect(SERVER, now);
    world.run(10);

    let client = &world.clients[0];
    assert_eq!(client.state(), ClientState::ConnectedAndAuthenticated);
    assert_eq!(client.last_error(), None);
    assert_eq!(client.slot(), Some(0));

    assert_eq!(world.server.session_count(), 1);
    let session = world.server.session(World::token_of(1)).unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(world.server.registry().disconnected, 1);
    assert_eq!(world.server.auth().ended, vec![PeerIdentity(1)]);
}

// =========================================================================
// Game traffic
// =========================================================================

#[test]
fn test_local_update_reaches_server_game_with_slot() {
    let mut world = World::new(4, PlatformAuth::default());
    world.join(1);
    world.run(5);

    let update = Message::ClientSendLocalUpdate(ClientSendLocalUpdate {
        slot: 0,
        update: ClientUpdate {
            forward_thrust: true,
            player_name: "ace".into(),
            ..ClientUpdate::default()
        },
    });
    world.clients[0]
        .send_message(&update, SendReliability::Unreliable)
        .unwrap();

    let inbound = world.tick();

    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].slot, 0);
    assert_eq!(inbound[0].identity, PeerIdentity(1));
    assert_eq!(inbound[0].message, update);
}

#[test]
fn test_world_update_reaches_every_authenticated_client() {
    let mut world = World::new(4, PlatformAuth::default());
    world.join(1);
    world.join(2);
    world.run(5);

    let mut update = ServerUpdateWorld::new(GameState::Active, 0);
    let identities = world.server.registry().slots.identities();
    for (slot, identity) in identities.iter().enumerate() {
        if let Some(identity) = identity {
            update.set_player(slot, *identity, 10, ShipUpdate::default());
        }
    }
    let msg: Message = update.into();
    world
        .server
        .send_to_all(&msg, SendReliability::Unreliable)
        .unwrap();

    world.now += Duration::from_millis(10);
    for client in &mut world.clients {
        assert_eq!(client.poll(world.now), vec![msg.clone()]);
    }
}

#[test]
fn test_voice_is_relayed_between_players() {
    let mut world = World::new(4, PlatformAuth::default());
    world.join(1);
    world.join(2);
    world.run(5);

    world.clients[0]
        .send_message(
            &Message::VoiceChatData(VoiceChatData {
                sender: PeerIdentity(1),
                payload: vec![0x55; 40],
            }),
            SendReliability::Unreliable,
        )
        .unwrap();
    world.now += Duration::from_millis(10);
    world.server.poll(world.now);

    let heard = world.clients[1].poll(world.now);
    assert_eq!(
        heard,
        vec![Message::VoiceChatData(VoiceChatData {
            sender: PeerIdentity(1),
            payload: vec![0x55; 40],
        })]
    );
    assert!(world.clients[0].poll(world.now).is_empty());
}

// =========================================================================
// Teardown
// =========================================================================

#[test]
fn test_client_disconnect_twice_notifies_server_once() {
    let mut world = World::new(4, PlatformAuth::default());
    world.join(1);
    world.run(5);

    world.clients[0].disconnect("bye");
    world.clients[0].disconnect("bye again");
    world.run(2);

    assert_eq!(world.clients[0].last_error(), Some("bye"));
    assert_eq!(world.server.session_count(), 0);
    assert_eq!(world.server.registry().disconnected, 1);
    assert_eq!(world.server.auth().ended, vec![PeerIdentity(1)]);
}

#[test]
fn test_server_shutdown_tells_clients_it_exited() {
    let mut world = World::new(4, PlatformAuth::default());
    world.join(1);
    world.join(2);
    world.run(5);

    world.server.shutdown();
    world.run(1);

    for client in &world.clients {
        assert_eq!(client.state(), ClientState::NotConnected);
        assert_eq!(client.last_error(), Some("Server has exited."));
    }
    assert!(!world.net.is_allocated(SERVER));
}

#[test]
fn test_kicked_client_sees_connection_failure() {
    let mut world = World::new(4, PlatformAuth::default());
    world.join(1);
    world.run(5);

    world.server.kick(World::token_of(1));
    world.run(1);

    // The loopback carries no reason code.
    assert_eq!(world.clients[0].state(), ClientState::NotConnected);
    assert_eq!(world.clients[0].last_error(), Some("Game server connection failure."));
}

// =========================================================================
// Liveness
// =========================================================================

#[test]
fn test_silent_client_is_kicked_only_after_timeout() {
    let mut world = World::new(4, PlatformAuth::default());
    world.join(1);
    world.run(5);
    let last_heard = world
        .server
        .session(World::token_of(1))
        .unwrap()
        .last_activity();
    let timeout = world.server.config().client_timeout();

    let just_inside = last_heard + timeout - Duration::from_millis(1);
    assert!(world.server.test_client_liveness_timeouts(just_inside).is_empty());

    let just_past = last_heard + timeout + Duration::from_millis(1);
    assert_eq!(
        world.server.test_client_liveness_timeouts(just_past),
        vec![World::token_of(1)]
    );
    assert_eq!(world.server.registry().disconnected, 1);
}

#[test]
fn test_client_connecting_to_absent_server_times_out() {
    let mut world = World::new(4, PlatformAuth::default());
    let mut client = ClientConnection::new(
        ClientConfig::default(),
        LoopbackTransport::with_identity(world.net.clone(), PeerIdentity(9)),
        PlayerAuth::new(9),
        NullPinger::default(),
    );
    // Nobody listens on this identity.
    client.connect(PeerIdentity(4242), world.t0);
    world.clients.push(client);
    world.run(3);

    let client = &mut world.clients[0];
    assert_eq!(client.state(), ClientState::ConnectingP2P);
    assert!(!client.test_liveness_timeout(world.t0 + Duration::from_millis(29_999)));
    assert!(client.test_liveness_timeout(world.t0 + Duration::from_millis(30_001)));
    assert_eq!(client.last_error(), Some("Timed out connecting to server."));
}
