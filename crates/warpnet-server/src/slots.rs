//! Admission control and player slot assignment.
//!
//! The server asks a [`SessionRegistry`] two questions: may this
//! connection start authenticating, and which slot does an authenticated
//! client get. It also reports every way a session leaves, so the
//! registry's counts never drift.
//!
//! [`SlotTable`] is the stock registry: fixed capacity, pending sessions
//! count against it, and slots are handed out lowest-free-first so a
//! given join order always produces the same layout.

use std::collections::HashSet;

use warpnet_protocol::{MAX_PLAYERS, PeerIdentity};
use warpnet_transport::ConnectionToken;

/// The game's side of admission control.
pub trait SessionRegistry {
    /// Asked when a client submits a ticket. Returning `true` reserves
    /// room for it until it is admitted or
    /// [`notify_auth_failed`](Self::notify_auth_failed) releases it.
    fn can_admit_new_connection(&mut self, token: ConnectionToken) -> bool;

    /// Gives an authenticated client a slot, or `None` if none is left.
    fn admit_authenticated_client(
        &mut self,
        token: ConnectionToken,
        identity: PeerIdentity,
    ) -> Option<u32>;

    /// A session that passed `can_admit_new_connection` ended before
    /// being admitted.
    fn notify_auth_failed(&mut self, token: ConnectionToken);

    /// An admitted client left. Its slot is free again.
    fn notify_disconnected(&mut self, token: ConnectionToken);
}

/// One occupied slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOccupant {
    pub token: ConnectionToken,
    pub identity: PeerIdentity,
}

/// Fixed-capacity registry with lowest-free-slot assignment.
#[derive(Debug)]
pub struct SlotTable {
    capacity: usize,
    pending: HashSet<ConnectionToken>,
    slots: [Option<SlotOccupant>; MAX_PLAYERS],
}

impl SlotTable {
    /// # Panics
    /// If `capacity` exceeds [`MAX_PLAYERS`].
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity <= MAX_PLAYERS,
            "slot table capacity {capacity} exceeds {MAX_PLAYERS}"
        );
        Self {
            capacity,
            pending: HashSet::new(),
            slots: [None; MAX_PLAYERS],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sessions reserved but not yet admitted.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn occupant(&self, slot: u32) -> Option<SlotOccupant> {
        self.slots.get(slot as usize).copied().flatten()
    }

    pub fn slot_of(&self, token: ConnectionToken) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| s.is_some_and(|o| o.token == token))
            .map(|i| i as u32)
    }

    /// Identity per slot, in the shape `ServerUpdateWorld` carries.
    pub fn identities(&self) -> [Option<PeerIdentity>; MAX_PLAYERS] {
        self.slots.map(|s| s.map(|o| o.identity))
    }

    fn release(&mut self, token: ConnectionToken) {
        for slot in &mut self.slots {
            if slot.is_some_and(|o| o.token == token) {
                *slot = None;
            }
        }
    }
}

impl SessionRegistry for SlotTable {
    fn can_admit_new_connection(&mut self, token: ConnectionToken) -> bool {
        if self.pending.contains(&token) {
            return true;
        }
        if self.pending.len() + self.active_count() >= self.capacity {
            tracing::debug!(
                %token,
                pending = self.pending.len(),
                active = self.active_count(),
                "no room for new connection"
            );
            return false;
        }
        self.pending.insert(token);
        true
    }

    fn admit_authenticated_client(
        &mut self,
        token: ConnectionToken,
        identity: PeerIdentity,
    ) -> Option<u32> {
        self.pending.remove(&token);
        let free = self.slots[..self.capacity].iter().position(Option::is_none)?;
        self.slots[free] = Some(SlotOccupant { token, identity });
        Some(free as u32)
    }

    fn notify_auth_failed(&mut self, token: ConnectionToken) {
        self.pending.remove(&token);
    }

    fn notify_disconnected(&mut self, token: ConnectionToken) {
        self.pending.remove(&token);
        self.release(token);
    }
}
