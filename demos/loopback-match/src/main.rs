//! A scripted match over the loopback transport.
//!
//! One 4-slot server and five clients share a `LoopbackNet`. The fifth
//! client is turned away, one player later quits, the fifth retries and
//! takes the freed slot, and finally the server shuts down. Everything is
//! logged through `tracing`; set `RUST_LOG=debug` for per-message detail.
//!
//! Pass a JSON file to override the server config:
//!
//! ```text
//! cargo run -p loopback-match -- server.json
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;
use warpnet::prelude::*;

const SERVER: PeerIdentity = PeerIdentity(1);
const TICK_RATE_HZ: u64 = 30;
const WORLD_UPDATE_EVERY: u64 = 3;
const QUIT_AT: u64 = 60;
const RETRY_AT: u64 = 70;
const SHUTDOWN_AT: u64 = 130;
const END_AT: u64 = 135;

// ---------------------------------------------------------------------------
// Fake platform
// ---------------------------------------------------------------------------

/// Tickets the platform has issued and not yet cancelled.
type IssuedTickets = Rc<RefCell<HashMap<PeerIdentity, Vec<u8>>>>;

struct DemoPlayer {
    id: PeerIdentity,
    issued: IssuedTickets,
    next_handle: u32,
}

impl ClientAuth for DemoPlayer {
    fn local_identity(&self) -> PeerIdentity {
        self.id
    }

    fn get_auth_ticket(&mut self) -> (Vec<u8>, TicketHandle) {
        let mut ticket = vec![0u8; 32];
        rand::rng().fill(&mut ticket[..]);
        self.issued.borrow_mut().insert(self.id, ticket.clone());
        self.next_handle += 1;
        (ticket, TicketHandle(self.next_handle))
    }

    fn cancel_auth_ticket(&mut self, _handle: TicketHandle) {
        self.issued.borrow_mut().remove(&self.id);
    }
}

struct DemoPlatform {
    issued: IssuedTickets,
    verdicts: Vec<AuthSessionResult>,
    active: HashSet<PeerIdentity>,
}

impl ServerAuth for DemoPlatform {
    fn secure(&self) -> bool {
        true
    }

    fn begin_auth_session(
        &mut self,
        ticket: &[u8],
        identity: PeerIdentity,
    ) -> Result<(), AuthRejection> {
        let known = self.issued.borrow().get(&identity).is_some_and(|t| t == ticket);
        if !known {
            return Err(AuthRejection(format!("no ticket issued to {identity}")));
        }
        self.active.insert(identity);
        self.verdicts.push(AuthSessionResult {
            identity,
            outcome: Ok(()),
        });
        Ok(())
    }

    fn end_auth_session(&mut self, identity: PeerIdentity) {
        self.active.remove(&identity);
        tracing::debug!(%identity, active = self.active.len(), "platform auth session ended");
    }

    fn poll_results(&mut self) -> Vec<AuthSessionResult> {
        std::mem::take(&mut self.verdicts)
    }
}

type Server = ServerConnection<LoopbackTransport, DemoPlatform, SlotTable>;
type Client = ClientConnection<LoopbackTransport, DemoPlayer, NullPinger>;

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

fn load_config() -> Result<ServerConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            let config: ServerConfig = serde_json::from_str(&text)?;
            tracing::info!(%path, "loaded server config");
            Ok(config)
        }
        None => Ok(ServerConfig::default()),
    }
}

fn random_input(name: &str) -> ClientUpdate {
    let mut rng = rand::rng();
    ClientUpdate {
        turn_left: rng.random_bool(0.2),
        turn_right: rng.random_bool(0.2),
        forward_thrust: rng.random_bool(0.5),
        reverse_thrust: false,
        fire: rng.random_bool(0.1),
        player_name: name.to_owned(),
        ..ClientUpdate::default()
    }
}

/// Builds the world snapshot every client receives.
fn world_update(server: &Server, scores: &HashMap<u32, u32>) -> Message {
    let mut update = ServerUpdateWorld::new(GameState::Active, 0);
    for (slot, identity) in server.registry().identities().iter().enumerate() {
        if let Some(identity) = identity {
            let score = scores.get(&(slot as u32)).copied().unwrap_or(0);
            update.set_player(slot, *identity, score, ShipUpdate::default());
        }
    }
    update.into()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let net = LoopbackNet::new();
    let issued = IssuedTickets::default();

    let platform = DemoPlatform {
        issued: issued.clone(),
        verdicts: Vec::new(),
        active: HashSet::new(),
    };
    let slots = SlotTable::new(config.max_players);
    let mut server: Server =
        ServerConnection::new(config, LoopbackTransport::new(net.clone()), platform, slots)?;
    server.set_identity(SERVER)?;

    let start = Instant::now();
    let mut clients: Vec<(String, Client)> = (0..5u64)
        .map(|n| {
            let id = PeerIdentity(101 + n);
            let client = ClientConnection::new(
                ClientConfig::default(),
                LoopbackTransport::with_identity(net.clone(), id),
                DemoPlayer {
                    id,
                    issued: issued.clone(),
                    next_handle: 0,
                },
                NullPinger::default(),
            );
            (format!("pilot-{}", n + 1), client)
        })
        .collect();
    for (_, client) in &mut clients {
        client.connect(SERVER, start);
    }

    let mut scores: HashMap<u32, u32> = HashMap::new();
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / TICK_RATE_HZ));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for tick in 0..END_AT {
        interval.tick().await;
        let now = Instant::now();

        match tick {
            QUIT_AT => clients[0].1.disconnect("Player quit."),
            RETRY_AT if clients[4].1.state() == ClientState::NotConnected => {
                tracing::info!(name = %clients[4].0, "retrying connection");
                clients[4].1.connect(SERVER, now);
            }
            SHUTDOWN_AT => server.shutdown(),
            _ => {}
        }

        if tick < SHUTDOWN_AT {
            for inbound in server.poll(now) {
                if let Message::ClientSendLocalUpdate(local) = &inbound.message {
                    if local.update.fire {
                        *scores.entry(inbound.slot).or_default() += 1;
                    }
                }
            }
            server.test_client_liveness_timeouts(now);
            if tick % WORLD_UPDATE_EVERY == 0 {
                let update = world_update(&server, &scores);
                server.send_to_all(&update, SendReliability::Unreliable)?;
            }
        }

        for (name, client) in &mut clients {
            for msg in client.poll(now) {
                if let Message::ServerPassAuthentication(pass) = msg {
                    tracing::info!(%name, slot = pass.slot, "joined the match");
                }
            }
            client.test_liveness_timeout(now);
            if let (ClientState::ConnectedAndAuthenticated, Some(slot)) =
                (client.state(), client.slot())
            {
                let local = Message::ClientSendLocalUpdate(ClientSendLocalUpdate {
                    slot,
                    update: random_input(name),
                });
                if let Err(e) = client.send_message(&local, SendReliability::Unreliable) {
                    tracing::warn!(%name, error = %e, "input not sent");
                }
            }
        }
    }

    for (name, client) in &mut clients {
        tracing::info!(
            %name,
            state = ?client.state(),
            last_error = client.last_error().unwrap_or("none"),
            "final client state"
        );
        client.shutdown();
    }
    let mut standings: Vec<(u32, u32)> = scores.into_iter().collect();
    standings.sort_unstable();
    tracing::info!(?standings, elapsed = ?start.elapsed(), "match over");
    Ok(())
}
