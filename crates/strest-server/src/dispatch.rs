//! Shared request-dispatch logic used by every transport: look up a
//! handler in the router, run the before/afterWrite filter chain around
//! it, and return the channel the transport drains to write responses
//! back to the caller. A route miss is answered with a synthetic 404,
//! matching `strest/router.go`'s `DefaultNotFoundHandler`.

use std::sync::Arc;

use strest_protocol::{Request, Response};
use tokio::sync::mpsc;

use crate::filter::FilterChain;
use crate::router::Router;
use crate::txn::Txn;

pub fn dispatch(router: Arc<Router>, req: Request) -> mpsc::UnboundedReceiver<Response> {
    let (sender, rx) = mpsc::unbounded_channel();
    let txn_id = req.txn_id.clone();
    let accept = req.txn_accept;
    let method = req.method;
    let uri = req.uri.clone();

    tokio::spawn(async move {
        let global = router.global_filter_chain().await;
        let matched = router.matches(method, &uri).await;
        let chain: FilterChain = match &matched {
            Some(m) if !m.local_filters.is_empty() => global.extended(&m.local_filters),
            _ => global,
        };

        let txn = Txn::from_parts(txn_id.clone(), accept, sender, chain.clone());

        match matched {
            Some(m) => {
                if chain.run_before(&req, &txn).await {
                    m.handler.handle(req, txn).await;
                }
            }
            None => {
                tracing::debug!(uri = %uri, ?method, "no route matched, returning 404");
                let mut resp = Response::new(txn_id, 404);
                resp.status_message = "Not Found".to_string();
                let _ = txn.complete(resp).await;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::handler::{FnHandler, Handler};
    use strest_protocol::Method;

    struct StampBefore;
    #[async_trait::async_trait]
    impl Filter for StampBefore {
        async fn before(&self, _req: &Request, _txn: &Txn) -> bool {
            true
        }

        async fn after_write(&self, resp: &mut Response) {
            resp.params.put("stamped", true);
        }
    }

    struct DenyAll;
    #[async_trait::async_trait]
    impl Filter for DenyAll {
        async fn before(&self, _req: &Request, txn: &Txn) -> bool {
            let mut resp = Response::new(txn.txn_id().to_string(), 403);
            resp.status_message = "denied by filter".to_string();
            let _ = txn.complete(resp).await;
            false
        }
    }

    async fn echo_handler(_req: Request, txn: Txn) {
        let _ = txn.complete(Response::ok(txn.txn_id().to_string())).await;
    }

    #[tokio::test]
    async fn global_filter_after_write_hook_runs_on_dispatch() {
        let router = Arc::new(Router::new());
        router.add_filter(Arc::new(StampBefore)).await;
        router
            .register(Method::Get, "/echo", Arc::new(FnHandler(echo_handler)))
            .await
            .unwrap();

        let req = Request::new("/echo", Method::Get);
        let mut rx = dispatch(router, req);
        let resp = rx.recv().await.unwrap();
        assert_eq!(resp.params.get("stamped"), Some(&strest_types::Value::Bool(true)));
    }

    #[tokio::test]
    async fn before_hook_returning_false_stops_dispatch_before_the_handler() {
        let router = Arc::new(Router::new());
        router.add_filter(Arc::new(DenyAll)).await;
        router
            .register(Method::Get, "/echo", Arc::new(FnHandler(echo_handler)))
            .await
            .unwrap();

        let req = Request::new("/echo", Method::Get);
        let mut rx = dispatch(router, req);
        let resp = rx.recv().await.unwrap();
        assert_eq!(resp.status_code, 403);
    }

    #[tokio::test]
    async fn unmatched_route_still_yields_404() {
        let router = Arc::new(Router::new());
        let req = Request::new("/missing", Method::Get);
        let mut rx = dispatch(router, req);
        let resp = rx.recv().await.unwrap();
        assert_eq!(resp.status_code, 404);
    }
}
