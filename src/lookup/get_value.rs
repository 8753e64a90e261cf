//! The GET_VALUE search orchestrator.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::common::{GetValueRequest, Id, Message, PeerId, PeerInfo};

use super::{
    Config, Frontier, LookupContext, LookupId, PeerFailure, Record, RecordLedger,
    ResponseHandler, SessionId, Ticks,
};

/// Invoked exactly once at the end of a lookup, with the most supported
/// value and the peers that reported it, or with `None` if no record was
/// received. The corroborating peer list feeds the caller's follow-up
/// correction step.
pub type FoundValueHandler = Box<dyn FnOnce(Option<Bytes>, Vec<PeerId>) + Send>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum LookupError {
    /// start was called twice.
    #[error("lookup already started")]
    AlreadyStarted,
    /// No usable initial candidates; no I/O was attempted.
    #[error("no initial candidates to query")]
    EmptyFrontier,
}

/// Lookup lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Holds configuration and the initial candidate set; no I/O yet.
    Created,
    /// start was accepted and the frontier is being seeded.
    Started,
    /// Requests are outstanding or candidates remain.
    Searching,
    /// Terminated with at least one record received.
    Completed,
    /// Terminated without any record.
    Failed,
}

/// The engine driving one iterative GET_VALUE search: dispatches requests
/// to the nearest unvisited candidates under a concurrency bound, consumes
/// responses, and converges on the most supported value.
pub struct GetValueLookup {
    target: Id,
    /// Built once; cloned into every dispatched request.
    request: GetValueRequest,
    quorum: usize,
    max_concurrent_requests: usize,
    request_timeout: Ticks,

    state: State,
    initial_peers: Vec<PeerInfo>,
    frontier: Frontier,
    /// Peers ever dispatched to, successfully or not. Append-only;
    /// guarantees at most one request per peer for this lookup's lifetime.
    requested: HashSet<PeerId>,
    ledger: RecordLedger,
    /// Outstanding sessions and the peer each was dispatched to. Deadlines
    /// are tracked by the pool's session table.
    in_flight: HashMap<SessionId, PeerId>,
    handler: Option<FoundValueHandler>,
}

impl GetValueLookup {
    pub fn new(
        config: &Config,
        target: Id,
        initial_peers: Vec<PeerInfo>,
        handler: FoundValueHandler,
    ) -> Self {
        Self {
            target,
            request: GetValueRequest { target },
            quorum: config.quorum,
            max_concurrent_requests: config.max_concurrent_requests,
            request_timeout: config.request_timeout,

            state: State::Created,
            initial_peers,
            frontier: Frontier::new(target),
            requested: HashSet::new(),
            ledger: RecordLedger::new(),
            in_flight: HashMap::new(),
            handler: Some(handler),
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Terminal and fully drained: safe to release from the pool.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() && self.in_flight.is_empty()
    }

    // === Public Methods ===

    /// Seed the frontier from the initial candidate set and saturate the
    /// concurrency budget.
    pub fn start(&mut self, cx: &mut LookupContext<'_>) -> Result<(), LookupError> {
        if self.state != State::Created {
            return Err(LookupError::AlreadyStarted);
        }
        self.state = State::Started;

        if self.initial_peers.is_empty() {
            return Err(LookupError::EmptyFrontier);
        }

        for peer in std::mem::take(&mut self.initial_peers) {
            self.frontier.insert(peer);
        }

        if self.frontier.is_empty() {
            // No initial peer could be mapped into the keyspace.
            return Err(LookupError::EmptyFrontier);
        }

        debug!(
            lookup = cx.lookup_id(),
            target = ?self.target,
            candidates = self.frontier.len(),
            "Starting lookup"
        );

        self.state = State::Searching;
        self.spawn(cx);

        Ok(())
    }

    // === Private Methods ===

    fn is_terminal(&self) -> bool {
        matches!(self.state, State::Completed | State::Failed)
    }

    /// Every outstanding session of this lookup.
    pub(crate) fn sessions(&self) -> Vec<SessionId> {
        self.in_flight.keys().copied().collect()
    }

    /// Dispatch requests to the nearest unvisited candidates until the
    /// concurrency budget is saturated or the frontier runs dry, then check
    /// the exhaustion termination rule.
    fn spawn(&mut self, cx: &mut LookupContext<'_>) {
        while self.in_flight.len() < self.max_concurrent_requests {
            let candidate = match self.frontier.pop_nearest() {
                Some(candidate) => candidate,
                None => break,
            };

            let peer = candidate.peer;
            self.requested.insert(peer.id.clone());

            match cx.send_request(&peer, self.request.clone()) {
                Ok(session) => {
                    trace!(
                        lookup = cx.lookup_id(),
                        peer = ?peer.id,
                        session,
                        "Dispatched request"
                    );

                    self.in_flight.insert(session, peer.id);
                }
                Err(error) => {
                    // Unreachable peers are dropped, never re-enqueued and
                    // never retried; the loop continues so the budget stays
                    // saturated.
                    debug!(
                        lookup = cx.lookup_id(),
                        peer = ?peer.id,
                        %error,
                        "Peer unreachable"
                    );
                }
            }
        }

        if self.in_flight.is_empty() && self.frontier.is_empty() && !self.is_terminal() {
            self.finish(cx.lookup_id());
        }
    }

    /// Terminate: resolve the most supported value and invoke the handler.
    fn finish(&mut self, lookup_id: LookupId) {
        let (value, peers) = match self.ledger.most_supported() {
            Some((value, peers)) => (Some(value.clone()), peers.to_vec()),
            None => (None, Vec::new()),
        };

        self.state = if value.is_some() {
            State::Completed
        } else {
            State::Failed
        };

        debug!(
            lookup = lookup_id,
            target = ?self.target,
            records = self.ledger.len(),
            corroborating = peers.len(),
            found = value.is_some(),
            "Lookup done"
        );

        if let Some(handler) = self.handler.take() {
            handler(value, peers);
        }
    }
}

impl ResponseHandler for GetValueLookup {
    fn response_timeout(&self) -> Ticks {
        self.request_timeout
    }

    fn matches(&self, message: &Message) -> bool {
        match message {
            Message::GetValueResponse(response) => response.target == self.target,
            _ => false,
        }
    }

    fn on_result(
        &mut self,
        cx: &mut LookupContext<'_>,
        session: SessionId,
        result: Result<Message, PeerFailure>,
    ) {
        let peer = match self.in_flight.remove(&session) {
            Some(peer) => peer,
            None => return,
        };
        cx.close(session);

        if self.is_terminal() {
            // Draining an in-flight request that settled after termination.
            trace!(lookup = cx.lookup_id(), peer = ?peer, "Ignoring late result");
            return;
        }

        match result {
            Ok(Message::GetValueResponse(response)) => {
                if let Some(value) = response.record {
                    let stored = self.ledger.insert(Record {
                        peer: peer.clone(),
                        value,
                    });

                    if !stored {
                        trace!(
                            lookup = cx.lookup_id(),
                            peer = ?peer,
                            "Ignoring repeated record from peer"
                        );
                    }
                }

                for candidate in response.closer_peers {
                    if self.requested.contains(&candidate.id)
                        || self.frontier.contains(&candidate.id)
                    {
                        continue;
                    }

                    self.frontier.insert(candidate);
                }

                let quorum_reached = self
                    .ledger
                    .most_supported()
                    .map_or(false, |(_, peers)| peers.len() >= self.quorum);

                if quorum_reached {
                    trace!(lookup = cx.lookup_id(), "Quorum reached");
                    self.finish(cx.lookup_id());
                    return;
                }
            }
            Ok(_) => {
                // matches() filters foreign messages before delivery; one
                // slipping through is a peer failure, not a lookup failure.
                debug!(lookup = cx.lookup_id(), peer = ?peer, "Malformed response");
            }
            Err(failure) => {
                debug!(lookup = cx.lookup_id(), peer = ?peer, %failure, "Peer failed");
            }
        }

        self.spawn(cx);
    }
}

#[cfg(test)]
mod test {
    use super::super::{SessionTable, Transport, TransportError};
    use super::*;

    struct NoopTransport {
        requests: usize,
    }

    impl Transport for NoopTransport {
        fn send_request(
            &mut self,
            _session: SessionId,
            _peer: &PeerInfo,
            _request: GetValueRequest,
        ) -> Result<(), TransportError> {
            self.requests += 1;
            Ok(())
        }
    }

    fn context<'a>(
        transport: &'a mut NoopTransport,
        sessions: &'a mut SessionTable,
    ) -> LookupContext<'a> {
        LookupContext {
            transport,
            sessions,
            now: 0,
            timeout: 10,
            lookup_id: 0,
        }
    }

    fn noop_handler() -> FoundValueHandler {
        Box::new(|_, _| {})
    }

    fn peers(count: usize) -> Vec<PeerInfo> {
        (0..count)
            .map(|_| PeerInfo::new(PeerId::random(), vec![]))
            .collect()
    }

    #[test]
    fn start_twice_fails() {
        let mut transport = NoopTransport { requests: 0 };
        let mut sessions = SessionTable::default();

        let mut lookup = GetValueLookup::new(
            &Config::default(),
            Id::random(),
            peers(3),
            noop_handler(),
        );

        lookup
            .start(&mut context(&mut transport, &mut sessions))
            .unwrap();

        assert_eq!(
            lookup.start(&mut context(&mut transport, &mut sessions)),
            Err(LookupError::AlreadyStarted)
        );
    }

    #[test]
    fn empty_initial_peer_set_fails_without_io() {
        let mut transport = NoopTransport { requests: 0 };
        let mut sessions = SessionTable::default();

        let mut lookup =
            GetValueLookup::new(&Config::default(), Id::random(), vec![], noop_handler());

        assert_eq!(
            lookup.start(&mut context(&mut transport, &mut sessions)),
            Err(LookupError::EmptyFrontier)
        );
        assert_eq!(transport.requests, 0);
    }

    #[test]
    fn unmappable_initial_peers_fail_without_io() {
        let mut transport = NoopTransport { requests: 0 };
        let mut sessions = SessionTable::default();

        let initial = vec![PeerInfo::new(PeerId(vec![]), vec![])];
        let mut lookup =
            GetValueLookup::new(&Config::default(), Id::random(), initial, noop_handler());

        assert_eq!(
            lookup.start(&mut context(&mut transport, &mut sessions)),
            Err(LookupError::EmptyFrontier)
        );
        assert_eq!(transport.requests, 0);
    }

    #[test]
    fn matches_own_target_responses_only() {
        use crate::common::GetValueResponse;

        let target = Id::random();
        let lookup =
            GetValueLookup::new(&Config::default(), target, peers(1), noop_handler());

        assert!(lookup.matches(&Message::GetValueResponse(GetValueResponse {
            target,
            record: None,
            closer_peers: vec![],
        })));

        assert!(!lookup.matches(&Message::GetValueResponse(GetValueResponse {
            target: Id::random(),
            record: None,
            closer_peers: vec![],
        })));

        assert!(!lookup.matches(&Message::GetValueRequest(GetValueRequest { target })));
    }

    #[test]
    fn response_timeout_follows_config() {
        let config = Config {
            request_timeout: 42,
            ..Default::default()
        };

        let lookup = GetValueLookup::new(&config, Id::random(), peers(1), noop_handler());

        assert_eq!(lookup.response_timeout(), 42);
    }
}
