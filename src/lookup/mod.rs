//! The value lookup engine: a registry of concurrent GET_VALUE searches and
//! the session boundary they run over.

mod config;
mod frontier;
mod get_value;
mod ledger;

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::common::{GetValueRequest, Id, Message, PeerInfo};

pub use config::{
    Config, DEFAULT_BUCKET_SIZE, DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_QUORUM,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use frontier::Frontier;
pub use get_value::{FoundValueHandler, GetValueLookup, LookupError, State};
pub use ledger::{Record, RecordLedger};

/// Abstract discrete scheduler time; the pool clock advances by one on each
/// [LookupPool::tick].
pub type Ticks = u64;

/// Identifies a lookup within its pool. Outstanding asynchronous operations
/// carry ids, never references to the lookup itself.
pub type LookupId = u64;

/// Correlates an outstanding request with the response or failure outcome
/// the session layer later delivers for it.
pub type SessionId = u64;

/// A per-peer failure outcome. Always absorbed by the lookup; never
/// propagated to the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PeerFailure {
    /// Stream open or handshake failed after dispatch.
    #[error("peer unreachable")]
    Unreachable,
    /// No response within the request deadline.
    #[error("request timed out")]
    Timeout,
    /// The response failed to decode into the expected structure.
    #[error("malformed response")]
    MalformedResponse,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("could not open a stream to the peer")]
    Unreachable,
    #[error("secure channel establishment failed")]
    Handshake,
}

/// The outbound boundary: opens (or reuses) a stream to a peer and sends a
/// request on it.
///
/// A synchronous `Err` means the peer could not be reached at all. The
/// asynchronous outcome of a successful send is delivered later through
/// [LookupPool::deliver] or [LookupPool::fail] under the same session id,
/// or times out on the pool clock.
pub trait Transport {
    fn send_request(
        &mut self,
        session: SessionId,
        peer: &PeerInfo,
        request: GetValueRequest,
    ) -> Result<(), TransportError>;
}

/// The capability to match and consume responses for in-flight exchanges.
///
/// The pool holds handlers keyed by correlation id and invokes
/// [ResponseHandler::on_result] exactly once per outstanding request, with
/// either a decoded response or a failure outcome. A failure may arrive at
/// any point between dispatch and the handler's terminal state.
pub trait ResponseHandler {
    /// Deadline applied to each request dispatched by this handler.
    fn response_timeout(&self) -> Ticks;

    /// Whether this message belongs to the handler's in-flight exchange.
    fn matches(&self, message: &Message) -> bool;

    /// Consume the outcome of an outstanding request.
    fn on_result(
        &mut self,
        cx: &mut LookupContext<'_>,
        session: SessionId,
        result: Result<Message, PeerFailure>,
    );
}

/// What a lookup may touch while reacting to an event: the transport to
/// dispatch on, the session table to register requests with, and the pool
/// clock.
///
/// `timeout` is taken from the handler's [ResponseHandler::response_timeout]
/// by the pool; every session opened through this context inherits it as
/// its deadline offset.
pub struct LookupContext<'a> {
    transport: &'a mut dyn Transport,
    sessions: &'a mut SessionTable,
    now: Ticks,
    timeout: Ticks,
    lookup_id: LookupId,
}

impl<'a> LookupContext<'a> {
    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn lookup_id(&self) -> LookupId {
        self.lookup_id
    }

    /// Open a session routed back to this lookup and send `request` on it.
    ///
    /// The session's deadline is the current tick plus the handler's
    /// response timeout.
    pub(crate) fn send_request(
        &mut self,
        peer: &PeerInfo,
        request: GetValueRequest,
    ) -> Result<SessionId, TransportError> {
        let session = self.sessions.open(self.lookup_id, self.now + self.timeout);

        match self.transport.send_request(session, peer, request) {
            Ok(()) => Ok(session),
            Err(error) => {
                self.sessions.close(session);
                Err(error)
            }
        }
    }

    /// Unregister a session whose outcome has been consumed.
    pub(crate) fn close(&mut self, session: SessionId) {
        self.sessions.close(session);
    }
}

/// Maps outstanding sessions back to the lookup awaiting them, along with
/// the deadline each session must settle by.
#[derive(Debug, Default)]
struct SessionTable {
    next_session_id: SessionId,
    routes: HashMap<SessionId, Route>,
}

#[derive(Debug, Clone, Copy)]
struct Route {
    lookup: LookupId,
    deadline: Ticks,
}

impl SessionTable {
    fn open(&mut self, lookup: LookupId, deadline: Ticks) -> SessionId {
        let session = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1);

        self.routes.insert(session, Route { lookup, deadline });

        session
    }

    fn close(&mut self, session: SessionId) {
        self.routes.remove(&session);
    }

    fn route(&self, session: SessionId) -> Option<LookupId> {
        self.routes.get(&session).map(|route| route.lookup)
    }

    /// Sessions whose deadline has passed at `now`, in session order.
    fn overdue(&self, now: Ticks) -> Vec<(LookupId, SessionId)> {
        let mut overdue = self
            .routes
            .iter()
            .filter(|(_, route)| route.deadline <= now)
            .map(|(session, route)| (route.lookup, *session))
            .collect::<Vec<_>>();

        overdue.sort_unstable_by_key(|(_, session)| *session);
        overdue
    }
}

/// Owns every in-progress [GetValueLookup], keyed by a generated id.
///
/// A lookup is released only once it is terminal and its outstanding
/// session count has reached zero, preserving the "stay alive until every
/// dispatched request settles" guarantee without shared ownership.
pub struct LookupPool {
    config: Config,
    lookups: HashMap<LookupId, GetValueLookup>,
    sessions: SessionTable,
    next_lookup_id: LookupId,
    now: Ticks,
}

impl LookupPool {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            lookups: HashMap::new(),
            sessions: SessionTable::default(),
            next_lookup_id: 0,
            now: 0,
        }
    }

    // === Getters ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current pool clock, in ticks.
    pub fn now(&self) -> Ticks {
        self.now
    }

    /// The number of lookups not yet released.
    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    // === Public Methods ===

    /// Start a value lookup for `target`, seeded with `initial_peers`
    /// (typically the routing table's nearest peers to the target).
    ///
    /// `handler` is invoked exactly once: with the most supported value and
    /// its corroborating peers, or with `None` if the search exhausts
    /// without receiving any record.
    pub fn get_value(
        &mut self,
        transport: &mut dyn Transport,
        target: Id,
        initial_peers: Vec<PeerInfo>,
        handler: FoundValueHandler,
    ) -> Result<LookupId, LookupError> {
        let lookup_id = self.next_lookup_id;
        self.next_lookup_id += 1;

        let mut lookup = GetValueLookup::new(&self.config, target, initial_peers, handler);

        let mut cx = LookupContext {
            transport,
            sessions: &mut self.sessions,
            now: self.now,
            timeout: lookup.response_timeout(),
            lookup_id,
        };

        lookup.start(&mut cx)?;

        if !lookup.is_settled() {
            self.lookups.insert(lookup_id, lookup);
        }

        Ok(lookup_id)
    }

    /// Route a decoded message to the lookup awaiting it.
    ///
    /// Messages that do not match the handler's in-flight exchange are
    /// ignored, not errors; the session stays pending until its real
    /// outcome arrives or it times out.
    pub fn deliver(&mut self, transport: &mut dyn Transport, session: SessionId, message: Message) {
        let lookup_id = match self.sessions.route(session) {
            Some(lookup_id) => lookup_id,
            None => {
                trace!(session, "Dropping message for unknown session");
                return;
            }
        };

        if let Some(lookup) = self.lookups.get_mut(&lookup_id) {
            let handler: &mut dyn ResponseHandler = lookup;

            if !handler.matches(&message) {
                debug!(lookup = lookup_id, session, "Ignoring unmatched message");
                return;
            }

            let mut cx = LookupContext {
                transport,
                sessions: &mut self.sessions,
                now: self.now,
                timeout: handler.response_timeout(),
                lookup_id,
            };

            handler.on_result(&mut cx, session, Ok(message));
        }

        self.release(lookup_id);
    }

    /// Deliver a failure outcome (connection error, malformed message) for
    /// an outstanding session.
    pub fn fail(&mut self, transport: &mut dyn Transport, session: SessionId, failure: PeerFailure) {
        let lookup_id = match self.sessions.route(session) {
            Some(lookup_id) => lookup_id,
            None => {
                trace!(session, "Dropping failure for unknown session");
                return;
            }
        };

        if let Some(lookup) = self.lookups.get_mut(&lookup_id) {
            let handler: &mut dyn ResponseHandler = lookup;

            let mut cx = LookupContext {
                transport,
                sessions: &mut self.sessions,
                now: self.now,
                timeout: handler.response_timeout(),
                lookup_id,
            };

            handler.on_result(&mut cx, session, Err(failure));
        }

        self.release(lookup_id);
    }

    /// Advance the pool clock by one tick: overdue requests time out (which
    /// may dispatch replacements), and settled lookups are released.
    pub fn tick(&mut self, transport: &mut dyn Transport) {
        self.now += 1;
        let now = self.now;

        for (lookup_id, session) in self.sessions.overdue(now) {
            if let Some(lookup) = self.lookups.get_mut(&lookup_id) {
                let handler: &mut dyn ResponseHandler = lookup;

                let mut cx = LookupContext {
                    transport: &mut *transport,
                    sessions: &mut self.sessions,
                    now,
                    timeout: handler.response_timeout(),
                    lookup_id,
                };

                handler.on_result(&mut cx, session, Err(PeerFailure::Timeout));
            } else {
                self.sessions.close(session);
            }
        }

        self.lookups.retain(|lookup_id, lookup| {
            let settled = lookup.is_settled();
            if settled {
                debug!(lookup = *lookup_id, "Released settled lookup");
            }
            !settled
        });
    }

    /// Cancel one lookup: its pending timers and response registrations are
    /// dropped and its callback never fires.
    pub fn cancel(&mut self, lookup_id: LookupId) {
        if let Some(lookup) = self.lookups.remove(&lookup_id) {
            for session in lookup.sessions() {
                self.sessions.close(session);
            }

            debug!(lookup = lookup_id, "Cancelled lookup");
        }
    }

    /// Cancel every lookup, e.g. on process shutdown.
    pub fn shutdown(&mut self) {
        let lookup_ids = self.lookups.keys().copied().collect::<Vec<_>>();

        for lookup_id in lookup_ids {
            self.cancel(lookup_id);
        }
    }

    // === Private Methods ===

    /// Drop a lookup once it is terminal and its in-flight requests have
    /// drained.
    fn release(&mut self, lookup_id: LookupId) {
        let settled = self
            .lookups
            .get(&lookup_id)
            .map_or(false, |lookup| lookup.is_settled());

        if settled {
            self.lookups.remove(&lookup_id);
            debug!(lookup = lookup_id, "Released settled lookup");
        }
    }
}
