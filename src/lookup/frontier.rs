//! Candidate frontier: peers known but not yet queried, ordered by distance
//! to the lookup target.

use crate::common::{Id, PeerId, PeerInfo, PeerInfoWithDistance};

/// A min-priority structure over candidate peers.
///
/// Kept as a sorted vec; distance to the target is the ordering key, ties
/// broken by identity bytes so pop order is reproducible.
#[derive(Debug, Clone)]
pub struct Frontier {
    target: Id,
    candidates: Vec<PeerInfoWithDistance>,
}

impl Frontier {
    pub fn new(target: Id) -> Self {
        Self {
            target,
            candidates: Vec::new(),
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.candidates
            .iter()
            .any(|candidate| &candidate.peer.id == peer)
    }

    // === Public Methods ===

    /// Insert a candidate at its distance-ordered position.
    ///
    /// Returns false without inserting if the peer is already present, or if
    /// its identity cannot be mapped into the keyspace.
    pub fn insert(&mut self, peer: PeerInfo) -> bool {
        let candidate = match PeerInfoWithDistance::new(peer, &self.target) {
            Some(candidate) => candidate,
            None => return false,
        };

        match self.candidates.binary_search(&candidate) {
            Err(pos) => {
                self.candidates.insert(pos, candidate);
                true
            }
            Ok(_) => false,
        }
    }

    /// Remove and return the nearest candidate.
    pub fn pop_nearest(&mut self) -> Option<PeerInfoWithDistance> {
        if self.candidates.is_empty() {
            return None;
        }

        Some(self.candidates.remove(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn peer() -> PeerInfo {
        PeerInfo::new(PeerId::random(), vec![])
    }

    #[test]
    fn pops_in_ascending_distance_order() {
        let target = Id::random();
        let mut frontier = Frontier::new(target);

        for _ in 0..10 {
            frontier.insert(peer());
        }

        let mut previous = None;
        while let Some(candidate) = frontier.pop_nearest() {
            if let Some(previous) = previous {
                assert!(previous <= candidate.distance);
            }
            previous = Some(candidate.distance);
        }
    }

    #[test]
    fn insert_is_a_set_operation() {
        let mut frontier = Frontier::new(Id::random());

        let peer = peer();

        assert!(frontier.insert(peer.clone()));
        assert!(!frontier.insert(peer));

        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn rejects_unmappable_identity() {
        let mut frontier = Frontier::new(Id::random());

        assert!(!frontier.insert(PeerInfo::new(PeerId(vec![]), vec![])));
        assert!(frontier.is_empty());
    }

    #[test]
    fn contains() {
        let mut frontier = Frontier::new(Id::random());

        let peer = peer();
        assert!(!frontier.contains(&peer.id));

        frontier.insert(peer.clone());
        assert!(frontier.contains(&peer.id));

        frontier.pop_nearest();
        assert!(!frontier.contains(&peer.id));
    }
}
