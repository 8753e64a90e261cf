//! Routing table: the authority for which known peers are closest to a target.

use std::collections::BTreeMap;

use tracing::trace;

use crate::common::{Id, PeerId};

/// Notifications emitted by a routing table for external observers.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingEvent {
    PeerAdded(PeerId),
    PeerRemoved(PeerId),
}

#[derive(thiserror::Error, Debug)]
pub enum RoutingTableError {
    /// The peer identity cannot be mapped into the keyspace.
    #[error("invalid peer: identity cannot be mapped into the keyspace")]
    InvalidPeer,
}

/// The contract the lookup engine relies on to seed searches.
pub trait RoutingTable {
    /// Insert `peer`, or move it to the most-recently-seen position of its
    /// bucket.
    fn update(&mut self, peer: &PeerId) -> Result<(), RoutingTableError>;

    /// Remove a peer. Idempotent; absent peers are a no-op.
    fn remove(&mut self, peer: &PeerId);

    /// Every known peer, order unspecified.
    fn get_all_peers(&self) -> Vec<PeerId>;

    /// Up to `count` known peers, ascending by distance to `target`.
    fn get_nearest_peers(&self, target: &Id, count: usize) -> Vec<PeerId>;

    /// Total number of peers in the table.
    fn size(&self) -> usize;
}

/// Reference [RoutingTable] implementation: peers bucketed by their distance
/// from the local id.
#[derive(Debug)]
pub struct KBucketsTable {
    local: Id,
    bucket_size: usize,
    buckets: BTreeMap<u8, Bucket>,
    events: Option<flume::Sender<RoutingEvent>>,
}

#[derive(Debug, Clone)]
struct Entry {
    peer: PeerId,
    id: Id,
}

impl KBucketsTable {
    /// Create a table centered on `local`, with at most `bucket_size` peers
    /// per bucket.
    pub fn new(local: Id, bucket_size: usize) -> Self {
        KBucketsTable {
            local,
            bucket_size,
            buckets: BTreeMap::new(),
            events: None,
        }
    }

    // === Options ===

    /// Emit [RoutingEvent]s on the given channel.
    pub fn with_events(mut self, sender: flume::Sender<RoutingEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    // === Getters ===

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn local_id(&self) -> &Id {
        &self.local
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|bucket| bucket.entries.is_empty())
    }

    // === Private Methods ===

    fn emit(&self, event: RoutingEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }

    #[cfg(test)]
    fn contains(&self, peer: &PeerId) -> bool {
        self.buckets
            .values()
            .any(|bucket| bucket.entries.iter().any(|entry| &entry.peer == peer))
    }
}

impl RoutingTable for KBucketsTable {
    fn update(&mut self, peer: &PeerId) -> Result<(), RoutingTableError> {
        let id = peer
            .keyspace_id()
            .ok_or(RoutingTableError::InvalidPeer)?;

        let index = self.local.bucket_index(&id);

        if index == 0 {
            // The local node's own keyspace point is never inserted.
            trace!(?peer, "Ignoring update for the local keyspace point");
            return Ok(());
        }

        let bucket = self.buckets.entry(index).or_default();
        let (added, evicted) = bucket.update(
            Entry {
                peer: peer.clone(),
                id,
            },
            self.bucket_size,
        );

        if let Some(old) = evicted {
            trace!(peer = ?old, bucket = index, "Evicted least-recently-seen peer");
            self.emit(RoutingEvent::PeerRemoved(old));
        }
        if added {
            self.emit(RoutingEvent::PeerAdded(peer.clone()));
        }

        Ok(())
    }

    fn remove(&mut self, peer: &PeerId) {
        let removed = self
            .buckets
            .values_mut()
            .any(|bucket| bucket.remove(peer));

        if removed {
            self.emit(RoutingEvent::PeerRemoved(peer.clone()));
        }
    }

    fn get_all_peers(&self) -> Vec<PeerId> {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.entries.iter().map(|entry| entry.peer.clone()))
            .collect()
    }

    fn get_nearest_peers(&self, target: &Id, count: usize) -> Vec<PeerId> {
        let mut entries = self
            .buckets
            .values()
            .flat_map(|bucket| bucket.entries.iter())
            .map(|entry| (entry.id.xor(target), entry.peer.clone()))
            .collect::<Vec<_>>();

        entries.sort();
        entries.truncate(count);

        entries.into_iter().map(|(_, peer)| peer).collect()
    }

    fn size(&self) -> usize {
        self.buckets
            .values()
            .fold(0, |acc, bucket| acc + bucket.entries.len())
    }
}

/// A fixed-capacity group of peers within the same distance range from the
/// local id, kept sorted by the least recently seen.
#[derive(Debug, Clone, Default)]
struct Bucket {
    entries: Vec<Entry>,
}

impl Bucket {
    /// Insert or refresh an entry, evicting the least-recently-seen peer when
    /// the bucket is full.
    ///
    /// Returns whether the entry is new, and the evicted peer if any.
    fn update(&mut self, incoming: Entry, capacity: usize) -> (bool, Option<PeerId>) {
        if let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.peer == incoming.peer)
        {
            // Move to the most-recently-seen end.
            self.entries.remove(index);
            self.entries.push(incoming);

            (false, None)
        } else if self.entries.len() < capacity {
            self.entries.push(incoming);

            (true, None)
        } else {
            let evicted = self.entries.remove(0);
            self.entries.push(incoming);

            (true, Some(evicted.peer))
        }
    }

    fn remove(&mut self, peer: &PeerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.peer != peer);
        before != self.entries.len()
    }
}
