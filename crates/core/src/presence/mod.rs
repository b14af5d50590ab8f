use std::collections::HashMap;

use crate::net::{Heartbeat, PeerId, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct PeerNode {
    pub id: PeerId,
    pub name: String,
    pub position: Position,
    pub last_seen: u64,
}

impl PeerNode {
    pub fn is_stale(&self, now: u64, timeout_ms: u64) -> bool {
        now.saturating_sub(self.last_seen) > timeout_ms
    }

    pub fn distance_from(&self, origin: &Position) -> f64 {
        origin.distance_to(&self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Joined,
    Updated,
    Ignored,
}

/// Known peers keyed by id. The local participant is never listed.
#[derive(Debug)]
pub struct PresenceRegistry {
    local_id: PeerId,
    peers: HashMap<PeerId, PeerNode>,
}

impl PresenceRegistry {
    pub fn new(local_id: impl Into<PeerId>) -> Self {
        Self {
            local_id: local_id.into(),
            peers: HashMap::new(),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn upsert(
        &mut self,
        id: &str,
        name: &str,
        position: Position,
        now: u64,
    ) -> PresenceChange {
        if id == self.local_id {
            return PresenceChange::Ignored;
        }

        match self.peers.get_mut(id) {
            Some(peer) => {
                peer.name = name.to_string();
                peer.position = position;
                peer.last_seen = peer.last_seen.max(now);
                PresenceChange::Updated
            }
            None => {
                self.peers.insert(
                    id.to_string(),
                    PeerNode {
                        id: id.to_string(),
                        name: name.to_string(),
                        position,
                        last_seen: now,
                    },
                );
                PresenceChange::Joined
            }
        }
    }

    pub fn ingest(&mut self, heartbeat: &Heartbeat, now: u64) -> PresenceChange {
        self.upsert(&heartbeat.sender_id, &heartbeat.name, heartbeat.position, now)
    }

    /// Removes every peer silent for longer than `timeout_ms` and returns them.
    pub fn prune(&mut self, now: u64, timeout_ms: u64) -> Vec<PeerNode> {
        let stale: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| p.is_stale(now, timeout_ms))
            .map(|p| p.id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| self.peers.remove(id))
            .collect()
    }

    /// Peers ordered by name, then id.
    pub fn snapshot(&self) -> Vec<PeerNode> {
        let mut peers: Vec<PeerNode> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        peers
    }

    pub fn get(&self, id: &str) -> Option<&PeerNode> {
        self.peers.get(id)
    }

    /// Case-insensitive exact name match. With duplicate names, whichever
    /// peer the map yields first wins.
    pub fn find_by_name(&self, name: &str) -> Option<&PeerNode> {
        let wanted = name.to_lowercase();
        self.peers
            .values()
            .find(|p| p.name.to_lowercase() == wanted)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerNode> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_heartbeat_is_ignored() {
        let mut registry = PresenceRegistry::new("me");

        let change = registry.upsert("me", "Riven-1", Position::new(1.0, 1.0), 100);

        assert_eq!(change, PresenceChange::Ignored);
        assert!(registry.is_empty());
        assert!(registry.get("me").is_none());
    }

    #[test]
    fn upsert_replaces_existing_record() {
        let mut registry = PresenceRegistry::new("me");

        assert_eq!(
            registry.upsert("b", "Bob", Position::new(1.0, 0.0), 100),
            PresenceChange::Joined
        );
        assert_eq!(
            registry.upsert("b", "Bobby", Position::new(2.0, 0.0), 200),
            PresenceChange::Updated
        );

        assert_eq!(registry.len(), 1);
        let peer = registry.get("b").unwrap();
        assert_eq!(peer.name, "Bobby");
        assert_eq!(peer.position, Position::new(2.0, 0.0));
        assert_eq!(peer.last_seen, 200);
    }

    #[test]
    fn last_seen_never_moves_backwards() {
        let mut registry = PresenceRegistry::new("me");
        registry.upsert("b", "Bob", Position::default(), 500);
        registry.upsert("b", "Bob", Position::new(3.0, 0.0), 400);

        let peer = registry.get("b").unwrap();
        assert_eq!(peer.last_seen, 500);
        assert_eq!(peer.position, Position::new(3.0, 0.0));
    }

    #[test]
    fn prune_removes_only_stale_peers() {
        let mut registry = PresenceRegistry::new("me");
        registry.upsert("old", "Old", Position::default(), 0);
        registry.upsert("edge", "Edge", Position::default(), 1000);
        registry.upsert("fresh", "Fresh", Position::default(), 4000);

        let removed = registry.prune(6000, 5000);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, "old");
        // Exactly at the timeout is still present.
        assert!(registry.get("edge").is_some());
        assert!(registry.get("fresh").is_some());

        registry.prune(6001, 5000);
        assert!(registry.get("edge").is_none());
    }

    #[test]
    fn find_by_name_is_case_insensitive() {
        let mut registry = PresenceRegistry::new("me");
        registry.upsert("b", "Bob", Position::default(), 0);

        assert_eq!(registry.find_by_name("bob").unwrap().id, "b");
        assert_eq!(registry.find_by_name("BOB").unwrap().id, "b");
        assert!(registry.find_by_name("bo").is_none());
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let mut registry = PresenceRegistry::new("me");
        registry.upsert("z", "Zed", Position::default(), 0);
        registry.upsert("l", "Lux", Position::default(), 0);

        let names: Vec<String> = registry.snapshot().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Lux", "Zed"]);
    }
}
