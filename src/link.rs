use dashmap::DashMap;
use dashmap::DashSet;

use crate::identity::Identity;

/// The undirected link graph between process identities.
///
/// Storage is a symmetric map keyed by identity; there are no ownership
/// edges here, purely relational bookkeeping consulted on termination.
#[derive(Default)]
pub struct LinkGraph {
    edges: DashMap<Identity, DashSet<Identity>>,
}

impl LinkGraph {
    pub fn new() -> LinkGraph {
        LinkGraph::default()
    }

    /// Adds the undirected edge `a <-> b`. Idempotent.
    pub fn link(&self, a: Identity, b: Identity) {
        self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
    }

    /// Removes the undirected edge `a <-> b`, if present.
    pub fn unlink(&self, a: Identity, b: Identity) {
        if let Some(peers) = self.edges.get(&a) {
            peers.remove(&b);
        }
        if let Some(peers) = self.edges.get(&b) {
            peers.remove(&a);
        }
    }

    /// Enumerates the peers linked to `id`.
    pub fn links_of(&self, id: Identity) -> Vec<Identity> {
        self.edges
            .get(&id)
            .map(|peers| peers.iter().map(|p| *p).collect())
            .unwrap_or_default()
    }

    /// Atomically snapshots and removes every edge touching `id`, returning
    /// the peer set it had at the moment of removal. Used by termination
    /// fan-out: the snapshot must be taken before peers are notified so a
    /// peer cannot observe a half-removed edge.
    pub fn take_links_of(&self, id: Identity) -> Vec<Identity> {
        let peers = self
            .edges
            .remove(&id)
            .map(|(_, peers)| peers.iter().map(|p| *p).collect::<Vec<_>>())
            .unwrap_or_default();
        for peer in &peers {
            if let Some(peer_links) = self.edges.get(peer) {
                peer_links.remove(&id);
            }
        }
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linking_is_symmetric() {
        let graph = LinkGraph::new();
        let a = Identity::next();
        let b = Identity::next();
        graph.link(a, b);
        assert_eq!(graph.links_of(a), vec![b]);
        assert_eq!(graph.links_of(b), vec![a]);
    }

    #[test]
    fn linking_is_idempotent() {
        let graph = LinkGraph::new();
        let a = Identity::next();
        let b = Identity::next();
        graph.link(a, b);
        graph.link(a, b);
        assert_eq!(graph.links_of(a), vec![b]);
    }

    #[test]
    fn take_links_removes_edges_from_both_sides() {
        let graph = LinkGraph::new();
        let a = Identity::next();
        let b = Identity::next();
        let c = Identity::next();
        graph.link(a, b);
        graph.link(a, c);
        let mut peers = graph.take_links_of(a);
        peers.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(peers, expected);
        assert!(graph.links_of(a).is_empty());
        assert!(graph.links_of(b).is_empty());
        assert!(graph.links_of(c).is_empty());
    }
}
