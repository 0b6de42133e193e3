//! Top-level server: owns the shared [`Router`] and runs all three
//! transports side by side until [`Server::shutdown`] is called.

use std::sync::Arc;

use strest_protocol::{Method, Request, Response};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::control::PING_URI;
use crate::error::ServerError;
use crate::handler::{FnHandler, Handler};
use crate::router::Router;
use crate::transport;
use crate::txn::Txn;

pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Server {
            config,
            router: Arc::new(Router::new()),
            shutdown_tx,
        }
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Registers the `/ping` control route. `run` calls this itself;
    /// callers that register their own control routes (e.g. `strest-shard`)
    /// before the first `run` don't need to call it separately.
    async fn register_ping(&self) -> Result<(), ServerError> {
        self.router
            .register_control(Method::Get, PING_URI, Arc::new(FnHandler(ping_handler)))
            .await
    }

    /// Runs all three transports concurrently until `shutdown` is called.
    pub async fn run(&self) -> Result<(), ServerError> {
        match self.register_ping().await {
            Ok(()) | Err(ServerError::DuplicateRegistration { .. }) => {}
            Err(err) => return Err(err),
        }

        let mut tasks: JoinSet<Result<(), ServerError>> = JoinSet::new();

        let router = self.router.clone();
        let addr = self.config.json_bind_addr.clone();
        let rx = self.shutdown_tx.subscribe();
        tasks.spawn(async move { transport::json::serve(&addr, router, rx).await });

        let router = self.router.clone();
        let addr = self.config.binary_bind_addr.clone();
        let rx = self.shutdown_tx.subscribe();
        tasks.spawn(async move { transport::binary::serve(&addr, router, rx).await });

        let router = self.router.clone();
        let addr = self.config.http_bind_addr.clone();
        let rx = self.shutdown_tx.subscribe();
        tasks.spawn(async move { transport::http::serve(&addr, router, rx).await });

        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(err),
                Err(join_err) => return Err(ServerError::Io(std::io::Error::other(join_err))),
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn ping_handler(_req: Request, txn: Txn) -> impl std::future::Future<Output = ()> + Send {
    async move {
        let mut resp = Response::new(txn.txn_id().to_string(), 200);
        resp.status_message = "OK".to_string();
        resp.params.put("data", "PONG");
        let _ = txn.complete(resp).await;
    }
}

#[cfg(test)]
mod ping_tests {
    use super::*;
    use strest_protocol::{Method, TxnAccept};

    #[tokio::test]
    async fn ping_replies_with_ok_and_pong() {
        let (txn, mut rx) = Txn::new("t1".into(), TxnAccept::Single);
        let req = Request::new("/ping", Method::Get);
        ping_handler(req, txn).await;

        let resp = rx.recv().await.unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.status_message, "OK");
        assert_eq!(resp.params.get_str("data"), Some("PONG"));
    }
}
