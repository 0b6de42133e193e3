//! Global and per-route hooks run around handler invocation: "before" hooks
//! gate dispatch, "afterWrite" hooks observe every [`crate::txn::Txn`]
//! write. Grounded on the before/after-filter chain that
//! `strest/router.go`'s request loop runs around its handler call.

use std::sync::Arc;

use strest_protocol::{Request, Response};

use crate::txn::Txn;

/// A hook that runs before a request reaches its handler and after every
/// response the handler writes.
#[async_trait::async_trait]
pub trait Filter: Send + Sync {
    /// Runs before the handler. Returning `false` stops the chain short of
    /// the handler; the filter is responsible for writing a terminal
    /// response on `txn` in that case.
    async fn before(&self, _req: &Request, _txn: &Txn) -> bool {
        true
    }

    /// Runs on every [`Txn::write`], in reverse registration order, with a
    /// chance to mutate the response before it reaches the transport.
    async fn after_write(&self, _resp: &mut Response) {}
}

/// An ordered set of filters: the global chain bound at bootstrap, plus
/// whatever local filters a route registered alongside its handler. Cheap
/// to clone — dispatch builds one of these per request.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Arc<Vec<Arc<dyn Filter>>>,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain").field("len", &self.filters.len()).finish()
    }
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        FilterChain { filters: Arc::new(filters) }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Appends `other`'s filters after this chain's own, for combining a
    /// global chain with a route's local filters.
    pub fn extended(&self, other: &[Arc<dyn Filter>]) -> Self {
        let mut combined = (*self.filters).clone();
        combined.extend(other.iter().cloned());
        FilterChain::new(combined)
    }

    /// Runs every "before" hook in registration order, short-circuiting on
    /// the first one that returns `false`.
    pub async fn run_before(&self, req: &Request, txn: &Txn) -> bool {
        for filter in self.filters.iter() {
            if !filter.before(req, txn).await {
                return false;
            }
        }
        true
    }

    /// Runs every "afterWrite" hook in reverse registration order.
    pub async fn run_after_write(&self, resp: &mut Response) {
        for filter in self.filters.iter().rev() {
            filter.after_write(resp).await;
        }
    }
}
