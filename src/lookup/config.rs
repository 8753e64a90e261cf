use super::Ticks;

/// Default number of distinct peers that must corroborate the same value
/// before a lookup terminates early on success.
pub const DEFAULT_QUORUM: usize = 2;

/// Default bound on simultaneous outstanding requests per lookup.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 3;

/// Default request deadline, in ticks of the pool clock.
pub const DEFAULT_REQUEST_TIMEOUT: Ticks = 10;

/// K = the default maximum size of a routing table bucket.
pub const DEFAULT_BUCKET_SIZE: usize = 20;

#[derive(Debug, Clone)]
/// Lookup engine configuration.
pub struct Config {
    /// Matching responses required for early termination on success.
    ///
    /// Defaults to [DEFAULT_QUORUM]
    pub quorum: usize,
    /// Maximum outstanding requests per lookup at any instant.
    ///
    /// Defaults to [DEFAULT_MAX_CONCURRENT_REQUESTS]
    pub max_concurrent_requests: usize,
    /// Per-request timeout in abstract ticks.
    ///
    /// The longer this is, the longer lookups wait on unresponsive peers.
    /// The shorter it is, the more responses from busy peers are missed.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Ticks,
    /// Routing table bucket capacity.
    ///
    /// Defaults to [DEFAULT_BUCKET_SIZE]
    pub bucket_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quorum: DEFAULT_QUORUM,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}
