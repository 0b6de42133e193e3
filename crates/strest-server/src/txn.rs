//! The per-request transaction handle a [`crate::Handler`] writes responses
//! through.
//!
//! Enforces the transaction shape: a `single`-accept transaction produces
//! exactly one terminal (`completed`) response; a `multi`-accept transaction
//! produces zero or more `continue` responses followed by exactly one
//! `completed` response. Writes after the terminal response is sent are
//! rejected rather than silently dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use strest_protocol::{Response, TxnAccept, TxnStatus};
use tokio::sync::mpsc;

use crate::error::ServerError;
use crate::filter::FilterChain;

/// A handle through which a handler writes one or more [`Response`]s for a
/// single request.
#[derive(Clone)]
pub struct Txn {
    txn_id: String,
    accept: TxnAccept,
    sender: mpsc::UnboundedSender<Response>,
    completed: Arc<AtomicBool>,
    filters: FilterChain,
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("txn_id", &self.txn_id)
            .field("accept", &self.accept)
            .field("completed", &self.completed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Txn {
    pub fn new(txn_id: String, accept: TxnAccept) -> (Self, mpsc::UnboundedReceiver<Response>) {
        Self::with_filters(txn_id, accept, FilterChain::default())
    }

    /// Builds a transaction carrying the filter chain (global plus any
    /// route-local filters) that [`Txn::write`] runs `afterWrite` hooks
    /// through. Used by [`crate::dispatch::dispatch`]; plain `Txn::new` is
    /// the right choice for tests that don't exercise filters.
    pub fn with_filters(
        txn_id: String,
        accept: TxnAccept,
        filters: FilterChain,
    ) -> (Self, mpsc::UnboundedReceiver<Response>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::from_parts(txn_id, accept, sender, filters), receiver)
    }

    /// Builds a transaction around an already-created sender. Used by
    /// [`crate::dispatch::dispatch`], which must hand its caller a receiver
    /// before the matching route (and thus the applicable local filters)
    /// is known.
    pub(crate) fn from_parts(
        txn_id: String,
        accept: TxnAccept,
        sender: mpsc::UnboundedSender<Response>,
        filters: FilterChain,
    ) -> Self {
        Txn {
            txn_id,
            accept,
            sender,
            completed: Arc::new(AtomicBool::new(false)),
            filters,
        }
    }

    /// The filter chain (global plus any route-local filters) this
    /// transaction's writes run `afterWrite` hooks through; the "before"
    /// hooks are run by the dispatcher before the handler is invoked.
    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    pub fn txn_id(&self) -> &str {
        &self.txn_id
    }

    pub fn accept(&self) -> TxnAccept {
        self.accept
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Writes a response. For `single`-accept transactions the first write
    /// is always the (only) terminal response, regardless of the
    /// `txn_status` the caller set. For `multi`-accept transactions the
    /// caller decides termination via `resp.txn_status`. Runs the
    /// transaction's `afterWrite` filter hooks, in reverse registration
    /// order, before handing the response to the transport.
    pub async fn write(&self, mut resp: Response) -> Result<(), ServerError> {
        if self.completed.load(Ordering::SeqCst) {
            return Err(ServerError::TxnAlreadyComplete {
                txn_id: self.txn_id.clone(),
            });
        }
        resp.txn_id = self.txn_id.clone();

        let terminal = match self.accept {
            TxnAccept::Single => {
                resp.txn_status = TxnStatus::Completed;
                true
            }
            TxnAccept::Multi => resp.txn_status == TxnStatus::Completed,
        };

        if terminal {
            self.completed.store(true, Ordering::SeqCst);
        }
        self.filters.run_after_write(&mut resp).await;
        self.sender
            .send(resp)
            .map_err(|_| ServerError::ConnectionClosed)
    }

    /// Convenience for the common `single`-accept case.
    pub async fn complete(&self, resp: Response) -> Result<(), ServerError> {
        self.write(resp).await
    }

    /// Writes an intermediate, non-terminal response on a `multi`-accept
    /// transaction. Errors if called on a `single`-accept transaction,
    /// since `single` has no notion of a non-terminal write.
    pub async fn send_continue(&self, mut resp: Response) -> Result<(), ServerError> {
        if self.accept != TxnAccept::Multi {
            return Err(ServerError::TxnAlreadyComplete {
                txn_id: self.txn_id.clone(),
            });
        }
        resp.txn_status = TxnStatus::Continue;
        self.write(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_accept_first_write_is_always_terminal() {
        let (txn, mut rx) = Txn::new("1".into(), TxnAccept::Single);
        let resp = Response::new("1", 200);
        txn.complete(resp).await.unwrap();
        let sent = rx.try_recv().unwrap();
        assert_eq!(sent.txn_status, TxnStatus::Completed);
        assert!(txn.is_complete());
    }

    #[tokio::test]
    async fn single_accept_second_write_is_rejected() {
        let (txn, _rx) = Txn::new("1".into(), TxnAccept::Single);
        txn.complete(Response::new("1", 200)).await.unwrap();
        let err = txn.complete(Response::new("1", 200)).await.unwrap_err();
        assert!(matches!(err, ServerError::TxnAlreadyComplete { .. }));
    }

    #[tokio::test]
    async fn multi_accept_allows_several_continues_then_one_completed() {
        let (txn, mut rx) = Txn::new("2".into(), TxnAccept::Multi);
        for _ in 0..3 {
            txn.send_continue(Response::new("2", 200)).await.unwrap();
        }
        txn.complete(Response::new("2", 200)).await.unwrap();
        let after = txn.complete(Response::new("2", 200)).await;
        assert!(after.is_err());

        let mut statuses = Vec::new();
        while let Ok(r) = rx.try_recv() {
            statuses.push(r.txn_status);
        }
        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses[3], TxnStatus::Completed);
    }
}
