//! Peer identities and address information.

use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::common::{Distance, Id};

/// An opaque peer identity.
///
/// The bytes are whatever the surrounding stack uses to identify peers
/// (e.g. a public key hash); this crate only hashes them into the keyspace
/// and compares them for equality.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl PeerId {
    pub fn random() -> PeerId {
        PeerId(Id::random().to_vec())
    }

    /// The keyspace point this peer occupies, or None if the identity is
    /// empty and cannot be mapped.
    pub fn keyspace_id(&self) -> Option<Id> {
        if self.0.is_empty() {
            return None;
        }

        Some(Id::from_key(&self.0))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({:x?})", &self.0)
    }
}

/// A reachable peer: identity plus its known addresses.
///
/// Equality and hashing consider the identity only, so a set of [PeerInfo]
/// behaves as a set of peers regardless of address churn.
#[derive(Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addresses: Vec<SocketAddr>,
}

impl PeerInfo {
    pub fn new(id: PeerId, addresses: Vec<SocketAddr>) -> PeerInfo {
        PeerInfo { id, addresses }
    }
}

impl PartialEq for PeerInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerInfo {}

impl Hash for PeerInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for PeerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerInfo")
            .field("id", &self.id)
            .field("addresses", &self.addresses)
            .finish()
    }
}

/// A candidate in the search frontier: a peer with its precomputed distance
/// to the lookup target.
///
/// Ordered by distance ascending, ties broken by identity bytes so that
/// iteration order is deterministic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfoWithDistance {
    pub peer: PeerInfo,
    pub distance: Distance,
}

impl PeerInfoWithDistance {
    /// Compute the candidate's distance from its keyspace id to `target`.
    pub fn new(peer: PeerInfo, target: &Id) -> Option<PeerInfoWithDistance> {
        let distance = peer.id.keyspace_id()?.xor(target);

        Some(PeerInfoWithDistance { peer, distance })
    }
}

impl Ord for PeerInfoWithDistance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.peer.id.cmp(&other.peer.id))
    }
}

impl PartialOrd for PeerInfoWithDistance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_identity_has_no_keyspace_id() {
        assert!(PeerId(vec![]).keyspace_id().is_none());
        assert!(PeerId::random().keyspace_id().is_some());
    }

    #[test]
    fn peer_info_compares_by_id() {
        let id = PeerId::random();

        let a = PeerInfo::new(id.clone(), vec!["127.0.0.1:4000".parse().unwrap()]);
        let b = PeerInfo::new(id, vec!["127.0.0.1:5000".parse().unwrap()]);

        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn candidates_order_by_distance() {
        let target = Id::random();

        let a = PeerInfoWithDistance::new(PeerInfo::new(PeerId::random(), vec![]), &target)
            .unwrap();
        let b = PeerInfoWithDistance::new(PeerInfo::new(PeerId::random(), vec![]), &target)
            .unwrap();

        assert_eq!(a.cmp(&b), a.distance.cmp(&b.distance));
    }
}
