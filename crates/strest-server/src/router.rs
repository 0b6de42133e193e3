//! The URI router: prefix (trailing-slash) or exact-match routes, a
//! longest-match wins, method-scoped route tables. Ported from
//! `strest/router.go`/`cheshire/router.go`'s `pathMatch`/`match` functions,
//! generalized to reject registrations under the reserved control-URI
//! namespace (`crate::control`).

use std::collections::HashMap;
use std::sync::Arc;

use strest_protocol::Method;
use tokio::sync::RwLock;

use crate::control::is_reserved;
use crate::error::ServerError;
use crate::filter::{Filter, FilterChain};
use crate::handler::Handler;

struct Entry {
    pattern: String,
    handler: Arc<dyn Handler>,
    local_filters: Vec<Arc<dyn Filter>>,
}

/// A route match: the handler to invoke and the local filters registered
/// alongside it, which run after the router's global filters.
pub struct Matched {
    pub handler: Arc<dyn Handler>,
    pub local_filters: Vec<Arc<dyn Filter>>,
}

/// Does `pattern` match `path`? A pattern ending in `/` matches any path
/// sharing that prefix; any other pattern must match exactly.
fn path_match(pattern: &str, path: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if !pattern.ends_with('/') {
        return pattern == path;
    }
    path.len() >= pattern.len() && path.starts_with(pattern)
}

/// Method-scoped, longest-prefix-match URI router.
pub struct Router {
    tables: RwLock<HashMap<Method, Vec<Entry>>>,
    global_filters: RwLock<Vec<Arc<dyn Filter>>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Router {
            tables: RwLock::new(HashMap::new()),
            global_filters: RwLock::new(Vec::new()),
        }
    }

    /// Appends a filter to the global chain, run for every route (ahead of
    /// each route's own local filters) in registration order.
    pub async fn add_filter(&self, filter: Arc<dyn Filter>) {
        self.global_filters.write().await.push(filter);
    }

    pub async fn global_filter_chain(&self) -> FilterChain {
        FilterChain::new(self.global_filters.read().await.clone())
    }

    /// Registers `handler` for `method`/`pattern`. Rejects empty patterns,
    /// patterns under the reserved control namespace, and a second
    /// registration of the same method/pattern pair.
    pub async fn register(
        &self,
        method: Method,
        pattern: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), ServerError> {
        self.register_with_filters(method, pattern, handler, Vec::new()).await
    }

    /// Like [`Router::register`], but also binds `local_filters`, run after
    /// the router's global "before" hooks and before the handler, with
    /// their "afterWrite" hooks running first (innermost) on the way out.
    pub async fn register_with_filters(
        &self,
        method: Method,
        pattern: impl Into<String>,
        handler: Arc<dyn Handler>,
        local_filters: Vec<Arc<dyn Filter>>,
    ) -> Result<(), ServerError> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(ServerError::EmptyPattern { pattern });
        }
        if is_reserved(&pattern) {
            return Err(ServerError::ReservedUri { pattern });
        }
        let mut tables = self.tables.write().await;
        let table = tables.entry(method).or_default();
        if table.iter().any(|e| e.pattern == pattern) {
            return Err(ServerError::DuplicateRegistration { method, pattern });
        }
        table.push(Entry { pattern, handler, local_filters });
        Ok(())
    }

    /// Registers a handler that is allowed to live under the control
    /// namespace; used internally by `strest-shard` for rebalance
    /// endpoints and by the server bootstrap for `/ping`.
    pub async fn register_control(
        &self,
        method: Method,
        pattern: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), ServerError> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(ServerError::EmptyPattern { pattern });
        }
        let mut tables = self.tables.write().await;
        let table = tables.entry(method).or_default();
        if table.iter().any(|e| e.pattern == pattern) {
            return Err(ServerError::DuplicateRegistration { method, pattern });
        }
        table.push(Entry { pattern, handler, local_filters: Vec::new() });
        Ok(())
    }

    /// Finds the longest-matching handler for `method`/`path`, together
    /// with its local filters. Among patterns of equal length the
    /// earliest-registered one wins (entries are scanned in registration
    /// order, and only a strictly longer match replaces the current best).
    pub async fn matches(&self, method: Method, path: &str) -> Option<Matched> {
        let tables = self.tables.read().await;
        let table = tables.get(&method)?;
        let mut best: Option<&Entry> = None;
        for entry in table {
            if !path_match(&entry.pattern, path) {
                continue;
            }
            match best {
                Some(b) if entry.pattern.len() <= b.pattern.len() => {}
                _ => best = Some(entry),
            }
        }
        best.map(|e| Matched {
            handler: e.handler.clone(),
            local_filters: e.local_filters.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::Txn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strest_protocol::Request;

    struct Counting(&'static str, Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl Handler for Counting {
        async fn handle(&self, _req: Request, _txn: Txn) {
            self.1.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let router = Router::new();
        let images = Arc::new(AtomicUsize::new(0));
        let thumbs = Arc::new(AtomicUsize::new(0));
        router
            .register(Method::Get, "/images/", Arc::new(Counting("images", images.clone())))
            .await
            .unwrap();
        router
            .register(
                Method::Get,
                "/images/thumbnails/",
                Arc::new(Counting("thumbs", thumbs.clone())),
            )
            .await
            .unwrap();

        let m = router.matches(Method::Get, "/images/thumbnails/cat.png").await.unwrap();
        m.handler
            .handle(Request::new("/images/thumbnails/cat.png", Method::Get), test_txn())
            .await;
        assert_eq!(thumbs.load(Ordering::SeqCst), 1);
        assert_eq!(images.load(Ordering::SeqCst), 0);

        let m2 = router.matches(Method::Get, "/images/dog.png").await.unwrap();
        m2.handler.handle(Request::new("/images/dog.png", Method::Get), test_txn()).await;
        assert_eq!(images.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exact_pattern_requires_exact_match() {
        let router = Router::new();
        router
            .register(Method::Get, "/favicon.ico", Arc::new(Counting("f", Arc::new(AtomicUsize::new(0)))))
            .await
            .unwrap();
        assert!(router.matches(Method::Get, "/favicon.ico").await.is_some());
        assert!(router.matches(Method::Get, "/favicon.ico/extra").await.is_none());
    }

    #[tokio::test]
    async fn methods_are_scoped_independently() {
        let router = Router::new();
        router
            .register(Method::Get, "/x", Arc::new(Counting("g", Arc::new(AtomicUsize::new(0)))))
            .await
            .unwrap();
        assert!(router.matches(Method::Get, "/x").await.is_some());
        assert!(router.matches(Method::Post, "/x").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let router = Router::new();
        router
            .register(Method::Get, "/x", Arc::new(Counting("a", Arc::new(AtomicUsize::new(0)))))
            .await
            .unwrap();
        let err = router
            .register(Method::Get, "/x", Arc::new(Counting("b", Arc::new(AtomicUsize::new(0)))))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateRegistration { .. }));
    }

    #[tokio::test]
    async fn control_namespace_cannot_be_shadowed_by_application_handlers() {
        let router = Router::new();
        let err = router
            .register(Method::Get, "/__c/rt/get", Arc::new(Counting("x", Arc::new(AtomicUsize::new(0)))))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ReservedUri { .. }));

        let err = router
            .register(Method::Get, "/ping", Arc::new(Counting("x", Arc::new(AtomicUsize::new(0)))))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ReservedUri { .. }));
    }

    #[tokio::test]
    async fn matched_route_carries_its_local_filters() {
        struct Noop;
        #[async_trait::async_trait]
        impl crate::filter::Filter for Noop {}

        let router = Router::new();
        router
            .register_with_filters(
                Method::Get,
                "/x",
                Arc::new(Counting("x", Arc::new(AtomicUsize::new(0)))),
                vec![Arc::new(Noop)],
            )
            .await
            .unwrap();

        let m = router.matches(Method::Get, "/x").await.unwrap();
        assert_eq!(m.local_filters.len(), 1);
    }

    fn test_txn() -> Txn {
        Txn::new("t".into(), strest_protocol::TxnAccept::Single).0
    }
}
