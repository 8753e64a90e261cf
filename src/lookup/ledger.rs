//! In-memory index of records received during a lookup, viewed both by
//! reporting peer and by value.

use std::collections::HashMap;

use bytes::Bytes;

use crate::common::PeerId;

/// One peer's reported value for a lookup target.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub peer: PeerId,
    pub value: Bytes,
}

/// All records seen so far by a single lookup.
///
/// The by-peer view is unique: the first response per peer wins and later
/// ones are ignored. The by-value view groups reporting peers per distinct
/// value, in first-seen order, to support quorum counting.
#[derive(Debug, Default)]
pub struct RecordLedger {
    by_peer: HashMap<PeerId, Bytes>,
    by_value: Vec<(Bytes, Vec<PeerId>)>,
}

impl RecordLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }

    /// The stored record value for a peer, if any.
    pub fn value_from(&self, peer: &PeerId) -> Option<&Bytes> {
        self.by_peer.get(peer)
    }

    /// The number of distinct peers that reported exactly this value.
    pub fn count_of(&self, value: &Bytes) -> usize {
        self.by_value
            .iter()
            .find(|(stored, _)| stored == value)
            .map_or(0, |(_, peers)| peers.len())
    }

    /// The value with the most distinct reporting peers, and those peers.
    ///
    /// Equal counts are resolved by first-seen order: among values tied at
    /// the maximum count, the one seen earliest wins.
    pub fn most_supported(&self) -> Option<(&Bytes, &[PeerId])> {
        let mut best: Option<(&Bytes, &[PeerId])> = None;

        for (value, peers) in &self.by_value {
            let count = best.map_or(0, |(_, peers)| peers.len());

            if peers.len() > count {
                best = Some((value, peers));
            }
        }

        best
    }

    // === Public Methods ===

    /// Store a record, unless one for the same peer already exists.
    ///
    /// Returns whether the record was stored.
    pub fn insert(&mut self, record: Record) -> bool {
        if self.by_peer.contains_key(&record.peer) {
            return false;
        }

        self.by_peer
            .insert(record.peer.clone(), record.value.clone());

        match self
            .by_value
            .iter_mut()
            .find(|(value, _)| value == &record.value)
        {
            Some((_, peers)) => peers.push(record.peer),
            None => self.by_value.push((record.value, vec![record.peer])),
        }

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(peer: &PeerId, value: &[u8]) -> Record {
        Record {
            peer: peer.clone(),
            value: Bytes::copy_from_slice(value),
        }
    }

    #[test]
    fn first_response_per_peer_wins() {
        let mut ledger = RecordLedger::new();
        let peer = PeerId::random();

        assert!(ledger.insert(record(&peer, b"first")));
        assert!(!ledger.insert(record(&peer, b"second")));

        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.value_from(&peer),
            Some(&Bytes::from_static(b"first"))
        );
        assert_eq!(ledger.count_of(&Bytes::from_static(b"second")), 0);
    }

    #[test]
    fn counts_distinct_reporting_peers() {
        let mut ledger = RecordLedger::new();

        for _ in 0..3 {
            ledger.insert(record(&PeerId::random(), b"a"));
        }
        ledger.insert(record(&PeerId::random(), b"b"));

        assert_eq!(ledger.count_of(&Bytes::from_static(b"a")), 3);
        assert_eq!(ledger.count_of(&Bytes::from_static(b"b")), 1);
        assert_eq!(ledger.count_of(&Bytes::from_static(b"c")), 0);
    }

    #[test]
    fn most_supported_is_arrival_order_independent() {
        // "b" ends up with the unique maximum count no matter how the
        // insertions interleave.
        let orders: [&[&[u8]]; 3] = [
            &[b"a", b"b", b"b"],
            &[b"b", b"a", b"b"],
            &[b"b", b"b", b"a"],
        ];

        for order in orders {
            let mut ledger = RecordLedger::new();

            for value in order {
                ledger.insert(record(&PeerId::random(), value));
            }

            let (value, peers) = ledger.most_supported().unwrap();
            assert_eq!(value, &Bytes::from_static(b"b"));
            assert_eq!(peers.len(), 2);
        }
    }

    #[test]
    fn equal_counts_resolve_to_first_seen() {
        let mut ledger = RecordLedger::new();

        ledger.insert(record(&PeerId::random(), b"early"));
        ledger.insert(record(&PeerId::random(), b"late"));

        let (value, _) = ledger.most_supported().unwrap();
        assert_eq!(value, &Bytes::from_static(b"early"));

        // A strictly higher count always beats first-seen priority.
        ledger.insert(record(&PeerId::random(), b"late"));
        let (value, _) = ledger.most_supported().unwrap();
        assert_eq!(value, &Bytes::from_static(b"late"));

        // Back to a tie; the earliest-seen value wins again.
        ledger.insert(record(&PeerId::random(), b"early"));
        let (value, _) = ledger.most_supported().unwrap();
        assert_eq!(value, &Bytes::from_static(b"early"));
    }

    #[test]
    fn corroborating_peers_are_tracked() {
        let mut ledger = RecordLedger::new();

        let peers = (0..2).map(|_| PeerId::random()).collect::<Vec<_>>();
        for peer in &peers {
            ledger.insert(record(peer, b"v"));
        }
        ledger.insert(record(&PeerId::random(), b"other"));

        let (_, corroborating) = ledger.most_supported().unwrap();
        assert_eq!(corroborating, peers.as_slice());
    }

    #[test]
    fn empty_ledger() {
        let ledger = RecordLedger::new();

        assert!(ledger.is_empty());
        assert!(ledger.most_supported().is_none());
    }
}
