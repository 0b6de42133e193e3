//! The JSON-socket transport: one STREST JSON envelope per line, framed
//! with [`tokio_util::codec::LinesCodec`]. Ported from the accept-loop
//! shape of `turbomcp-tcp/src/transport.rs`'s `start_server`/
//! `handle_tcp_connection_framed`.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::codec::{Framed, LinesCodec};

use crate::dispatch::dispatch;
use crate::error::ServerError;
use crate::router::Router;

/// Runs the JSON-socket listener until `shutdown_rx` fires, draining all
/// connection tasks before returning.
pub async fn serve(
    bind_addr: &str,
    router: Arc<Router>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "json transport listening");
    let mut connections: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("json transport shutting down");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let router = router.clone();
                let conn_shutdown = shutdown_rx.resubscribe();
                connections.spawn(async move {
                    if let Err(err) = handle_connection(stream, router, conn_shutdown).await {
                        tracing::warn!(%peer, error = %err, "json connection closed with error");
                    }
                });
            }
        }
    }

    connections.shutdown().await;
    Ok(())
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    router: Arc<Router>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let framed = Framed::new(stream, LinesCodec::new_with_max_length(16 * 1024 * 1024));
    let (mut sink, mut stream) = framed.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // A single writer loop owns the sink, serializing all writes for this
    // connection so interleaved responses never interleave their bytes.
    let writer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if sink.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            line = stream.next() => {
                let Some(line) = line else { break };
                let line = line.map_err(|e| ServerError::Io(std::io::Error::other(e)))?;
                let req = match strest_protocol::json::decode_request(line.as_bytes()) {
                    Ok(req) => req,
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping malformed json request");
                        continue;
                    }
                };

                let mut rx = dispatch(router.clone(), req);
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    while let Some(resp) = rx.recv().await {
                        match strest_protocol::json::encode_response(&resp) {
                            Ok(bytes) => {
                                let _ = out_tx.send(String::from_utf8_lossy(&bytes).into_owned());
                            }
                            Err(err) => tracing::warn!(error = %err, "failed to encode response"),
                        }
                    }
                });
            }
        }
    }

    drop(out_tx);
    let _ = writer.await;
    Ok(())
}
