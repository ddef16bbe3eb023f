//! Peer registry: the set of peers currently present on the bus, keyed by peer ID.
//!
//! Single writer. Hosts that read from another thread must synchronize externally.

use std::collections::{BTreeSet, HashMap};

use crate::peer::{PeerId, PeerRecord, Role};

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peer entered. Parses address and headers, inserts or replaces the record, returns the primary role.
    pub fn on_peer_enter(
        &mut self,
        peer_id: PeerId,
        display_name: &str,
        transport_address: &str,
        headers: &HashMap<String, String>,
    ) -> Role {
        let record = PeerRecord::from_enter(peer_id.clone(), display_name, transport_address, headers);
        let role = record.role();
        if record.ip_address.is_empty() {
            tracing::debug!(%peer_id, address = transport_address, "unparseable transport address");
        }
        if self.peers.insert(peer_id.clone(), record).is_some() {
            tracing::debug!(%peer_id, %role, "peer re-entered, record replaced");
        }
        role
    }

    /// Peer exited. Returns the evicted record; None (no-op) if the peer was never registered.
    pub fn on_peer_exit(&mut self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.peers.remove(peer_id)
    }

    /// Primary role of a registered peer; Unknown when not registered.
    pub fn role_of(&self, peer_id: &PeerId) -> Role {
        self.peers
            .get(peer_id)
            .map(PeerRecord::role)
            .unwrap_or(Role::Unknown)
    }

    /// Registered peers whose role set contains `role`.
    pub fn peers_with_role(&self, role: Role) -> BTreeSet<PeerId> {
        self.peers
            .values()
            .filter(|r| r.roles.contains(role))
            .map(|r| r.peer_id.clone())
            .collect()
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(peer_id)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Update the freeze capability flag after a CANBEFROZEN broadcast. Returns false if not registered.
    pub fn set_can_be_frozen(&mut self, peer_id: &PeerId, can_be_frozen: bool) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(record) => {
                record.can_be_frozen = can_be_frozen;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
