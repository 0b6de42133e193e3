//! Tunables for a connection pool to a single STREST binary-transport endpoint.

use std::time::Duration;

/// Configuration for a [`crate::pool::Pool`].
///
/// Defaults mirror the original client's `pool.go`/`connection.go` constants:
/// a small fixed pool, a generous in-flight budget per connection, a 20s
/// borrow wait before giving up, and a 25s ping interval with 5s reconnect
/// coalescing so a flapping link doesn't retry in a tight loop.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) addr: String,
    pub(crate) pool_size: usize,
    pub(crate) max_in_flight: usize,
    pub(crate) borrow_timeout: Duration,
    pub(crate) ping_interval: Duration,
    pub(crate) ping_timeout: Duration,
    pub(crate) reconnect_min_interval: Duration,
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        ClientConfig {
            addr: addr.into(),
            pool_size: 4,
            max_in_flight: 400,
            borrow_timeout: Duration::from_secs(20),
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(10),
            reconnect_min_interval: Duration::from_secs(5),
        }
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    pub fn borrow_timeout(mut self, d: Duration) -> Self {
        self.borrow_timeout = d;
        self
    }

    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// The in-flight budget spread evenly across the pool, i.e. the
    /// per-connection cap used by the borrow policy. Always at least 1.
    pub(crate) fn max_in_flight_per_conn(&self) -> usize {
        (self.max_in_flight / self.pool_size).max(1)
    }
}
