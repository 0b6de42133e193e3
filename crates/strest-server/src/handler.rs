//! The application-facing handler trait dispatched to by [`crate::Router`].

use strest_protocol::Request;

use crate::txn::Txn;

/// Implemented by application request handlers, registered against a route
/// pattern and method via [`crate::Router::register`].
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: Request, txn: Txn);
}

/// Adapts a plain async closure into a [`Handler`], for simple routes that
/// don't need their own named type.
pub struct FnHandler<F>(pub F);

#[async_trait::async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request, Txn) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn handle(&self, req: Request, txn: Txn) {
        (self.0)(req, txn).await;
    }
}
