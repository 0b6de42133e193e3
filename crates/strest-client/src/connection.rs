//! A single binary-transport connection: one reader task demuxing
//! responses onto a per-txn channel by `txn_id`, one writer task
//! serializing writes, and an in-flight map bounded by the pool's
//! per-connection budget.
//!
//! Grounded on the original client's `connection.go`, whose `listener()`
//! and `eventLoop()` goroutines play the same roles as the reader/writer
//! tasks here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use strest_protocol::binary;
use strest_protocol::{Method, Request, Response, TxnAccept};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::ClientError;

type InFlight = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Result<Response, ClientError>>>>>;

#[derive(Debug)]
pub(crate) struct Connection {
    addr: String,
    alive: AtomicBool,
    in_flight_count: AtomicUsize,
    in_flight: InFlight,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
}

impl Connection {
    pub(crate) async fn connect(addr: &str) -> Result<Arc<Self>, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let (mut read_half, mut write_half) = stream.into_split();

        let mut hello = strest_types::DynMap::new();
        hello.put("useragent", "strest-rust-client");
        let hello_frame = binary::encode_hello(&hello)?;
        write_half.write_all(&hello_frame).await?;
        write_half.flush().await?;

        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
        let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let conn = Arc::new(Connection {
            addr: addr.to_string(),
            alive: AtomicBool::new(true),
            in_flight_count: AtomicUsize::new(0),
            in_flight: in_flight.clone(),
            outbox: outbox_tx,
        });

        tokio::spawn(async move {
            while let Some(frame) = outbox_rx.recv().await {
                if write_half.write_all(&frame).await.is_err() || write_half.flush().await.is_err() {
                    break;
                }
            }
        });

        let reader_conn = conn.clone();
        tokio::spawn(async move {
            loop {
                match binary::decode_response(&mut read_half).await {
                    Ok(resp) => reader_conn.route_response(resp),
                    Err(err) => {
                        tracing::debug!(addr = %reader_conn.addr, %err, "connection read loop ended");
                        break;
                    }
                }
            }
            reader_conn.mark_dead_and_drain();
        });

        Ok(conn)
    }

    fn route_response(&self, resp: Response) {
        let sender = self.in_flight.lock().get(&resp.txn_id).cloned();
        match sender {
            Some(tx) => {
                let _ = tx.send(Ok(resp));
            }
            None => tracing::debug!(txn_id = %resp.txn_id, "late arrival for unknown or abandoned txn"),
        }
    }

    fn mark_dead_and_drain(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut map = self.in_flight.lock();
        for (_, tx) in map.drain() {
            let _ = tx.send(Err(ClientError::ConnectionClosed));
        }
        self.in_flight_count.store(0, Ordering::SeqCst);
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight_count.load(Ordering::SeqCst)
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends `req` and returns the per-txn channel of responses. For a
    /// `single`-accept request this yields exactly one item; for `multi`
    /// it yields zero or more `continue` items followed by one `completed`.
    pub(crate) fn send(
        &self,
        req: Request,
    ) -> Result<mpsc::UnboundedReceiver<Result<Response, ClientError>>, ClientError> {
        if !self.is_alive() {
            return Err(ClientError::ConnectionClosed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let txn_id = req.txn_id.clone();
        let frame = binary::encode_request(&req)?;

        self.in_flight.lock().insert(txn_id, tx);
        self.in_flight_count.fetch_add(1, Ordering::SeqCst);

        self.outbox
            .send(frame)
            .map_err(|_| ClientError::ConnectionClosed)?;
        Ok(rx)
    }

    /// Marks a txn entry retired once the caller is done draining it
    /// (terminal response seen, or the caller gave up waiting).
    pub(crate) fn retire(&self, txn_id: &str) {
        if self.in_flight.lock().remove(txn_id).is_some() {
            self.in_flight_count.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub(crate) async fn ping(&self, timeout: Duration) -> Result<(), ClientError> {
        let mut req = Request::new("/ping", Method::Get);
        req.txn_accept = TxnAccept::Single;
        let txn_id = req.txn_id.clone();
        let mut rx = self.send(req)?;

        let result = tokio::time::timeout(timeout, rx.recv()).await;
        self.retire(&txn_id);
        match result {
            Ok(Some(Ok(_resp))) => Ok(()),
            Ok(Some(Err(err))) => Err(err),
            Ok(None) => Err(ClientError::ConnectionClosed),
            Err(_) => Err(ClientError::PingTimeout {
                addr: self.addr.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    pub(crate) fn close(&self) {
        self.mark_dead_and_drain();
    }
}

#[cfg(test)]
impl Connection {
    /// Builds a connection with no backing socket, for exercising pool
    /// borrow/budget logic without a live server. The outbox end is
    /// dropped immediately, so anything sent through it is discarded
    /// rather than ever producing a response.
    pub(crate) fn stub(addr: &str, in_flight_count: usize) -> Arc<Self> {
        let (outbox, _rx) = mpsc::unbounded_channel();
        Arc::new(Connection {
            addr: addr.to_string(),
            alive: AtomicBool::new(true),
            in_flight_count: AtomicUsize::new(in_flight_count),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            outbox,
        })
    }

    pub(crate) fn set_in_flight_count(&self, n: usize) {
        self.in_flight_count.store(n, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_connection_state_is_empty() {
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
        assert!(in_flight.lock().is_empty());
    }

    #[test]
    fn stub_reports_the_in_flight_count_it_was_built_with() {
        let conn = Connection::stub("127.0.0.1:0", 3);
        assert!(conn.is_alive());
        assert_eq!(conn.in_flight_count(), 3);
    }
}
