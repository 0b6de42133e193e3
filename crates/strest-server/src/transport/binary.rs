//! The binary-frame transport. Connections begin with a `Hello` frame (see
//! `strest_protocol::binary`), after which the client streams length-prefixed
//! `Request` frames and receives length-prefixed `Response` frames back.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use crate::dispatch::dispatch;
use crate::error::ServerError;
use crate::router::Router;

pub async fn serve(
    bind_addr: &str,
    router: Arc<Router>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "binary transport listening");
    let mut connections: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("binary transport shutting down");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let router = router.clone();
                connections.spawn(async move {
                    if let Err(err) = handle_connection(stream, router).await {
                        tracing::warn!(%peer, error = %err, "binary connection closed with error");
                    }
                });
            }
        }
    }

    connections.shutdown().await;
    Ok(())
}

async fn handle_connection(stream: tokio::net::TcpStream, router: Arc<Router>) -> Result<(), ServerError> {
    let (mut read_half, mut write_half) = tokio::io::split(stream);

    // First frame on the wire is always Hello.
    let hello = strest_protocol::binary::decode_hello(&mut read_half).await?;
    tracing::debug!(?hello, "binary client said hello");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    loop {
        let req = match strest_protocol::binary::decode_request(&mut read_half).await {
            Ok(req) => req,
            Err(_) => break,
        };

        let mut rx = dispatch(router.clone(), req);
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(resp) = rx.recv().await {
                match strest_protocol::binary::encode_response(&resp) {
                    Ok(frame) => {
                        let _ = out_tx.send(frame);
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to encode response"),
                }
            }
        });
    }

    drop(out_tx);
    let _ = writer.await;
    Ok(())
}
