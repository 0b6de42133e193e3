//! A fixed-size pool of [`Connection`]s to one host, borrowed round-robin
//! and bounded by a per-connection in-flight budget. Ported from the
//! original's `pool.go` (`Borrow`/`Return`/`ReturnBroken`), replacing its
//! blocking condition variable with an async notify-and-retry loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use strest_protocol::{Method, Request, Response, TxnAccept, TxnStatus};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ClientError;

#[derive(Debug)]
pub struct Pool {
    config: ClientConfig,
    slots: Mutex<Vec<Arc<Connection>>>,
    next: AtomicUsize,
    slot_free: Notify,
    last_reconnect: Mutex<Option<Instant>>,
    shutdown_tx: broadcast::Sender<()>,
    ping_task: Mutex<Option<JoinHandle<()>>>,
}

impl Pool {
    pub async fn connect(config: ClientConfig) -> Result<Arc<Self>, ClientError> {
        let mut slots = Vec::with_capacity(config.pool_size);
        for _ in 0..config.pool_size {
            slots.push(Connection::connect(&config.addr).await?);
        }
        let (shutdown_tx, _) = broadcast::channel(1);

        let pool = Arc::new(Pool {
            config,
            slots: Mutex::new(slots),
            next: AtomicUsize::new(0),
            slot_free: Notify::new(),
            last_reconnect: Mutex::new(None),
            shutdown_tx,
            ping_task: Mutex::new(None),
        });
        pool.clone().spawn_ping_loop();
        Ok(pool)
    }

    fn spawn_ping_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.config.ping_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tick.tick() => self.ping_all_and_reconnect_dead().await,
                }
            }
        });
        *self.ping_task.lock() = Some(handle);
    }

    async fn ping_all_and_reconnect_dead(self: &Arc<Self>) {
        let snapshot: Vec<Arc<Connection>> = self.slots.lock().clone();
        for (idx, conn) in snapshot.into_iter().enumerate() {
            if conn.ping(self.config.ping_timeout).await.is_err() {
                tracing::warn!(addr = %conn.addr(), "ping failed, scheduling reconnect");
                conn.close();
                self.reconnect_slot(idx).await;
            }
        }
    }

    async fn reconnect_slot(self: &Arc<Self>, idx: usize) {
        let wait = {
            let last = self.last_reconnect.lock();
            last.map(|at| self.config.reconnect_min_interval.saturating_sub(at.elapsed()))
        };
        if let Some(wait) = wait {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        *self.last_reconnect.lock() = Some(Instant::now());
        match Connection::connect(&self.config.addr).await {
            Ok(fresh) => {
                let mut slots = self.slots.lock();
                if idx < slots.len() {
                    slots[idx] = fresh;
                }
                drop(slots);
                self.slot_free.notify_waiters();
            }
            Err(err) => tracing::warn!(addr = %self.config.addr, %err, "reconnect failed, will retry next ping"),
        }
    }

    /// Picks the next connection round-robin among those under the
    /// per-connection in-flight budget, waiting up to `borrow_timeout` for
    /// one to free up before failing.
    async fn borrow(&self) -> Result<Arc<Connection>, ClientError> {
        let deadline = Instant::now() + self.config.borrow_timeout;
        loop {
            {
                let slots = self.slots.lock();
                let len = slots.len();
                let budget = self.config.max_in_flight_per_conn();
                for _ in 0..len {
                    let i = self.next.fetch_add(1, Ordering::Relaxed) % len;
                    let candidate = &slots[i];
                    if candidate.is_alive() && candidate.in_flight_count() < budget {
                        return Ok(candidate.clone());
                    }
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::PoolSaturated {
                    waited_ms: self.config.borrow_timeout.as_millis() as u64,
                });
            }
            let _ = tokio::time::timeout(remaining, self.slot_free.notified()).await;
        }
    }

    /// Sends a `single`-accept request and awaits its one terminal response.
    pub async fn call(&self, mut req: Request) -> Result<Response, ClientError> {
        req.txn_accept = TxnAccept::Single;
        let conn = self.borrow().await?;
        let txn_id = req.txn_id.clone();
        let mut rx = conn.send(req)?;
        let result = rx.recv().await;
        conn.retire(&txn_id);
        self.slot_free.notify_one();
        match result {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(err)) => Err(err),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Sends a `multi`-accept request and returns a channel yielding each
    /// `continue`/`completed` response as it arrives.
    pub async fn call_streaming(
        self: &Arc<Self>,
        mut req: Request,
    ) -> Result<tokio::sync::mpsc::UnboundedReceiver<Result<Response, ClientError>>, ClientError> {
        req.txn_accept = TxnAccept::Multi;
        let conn = self.borrow().await?;
        let txn_id = req.txn_id.clone();
        let rx = conn.send(req)?;
        let (out_tx, out_rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(drain_until_complete(self.clone(), conn, txn_id, rx, out_tx));
        Ok(out_rx)
    }

    pub async fn convenience_ping(&self) -> Result<(), ClientError> {
        let conn = self.borrow().await?;
        let res = conn.ping(self.config.ping_timeout).await;
        self.slot_free.notify_one();
        res
    }

    pub fn pool_size(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.ping_task.lock().take() {
            handle.abort();
        }
        for conn in self.slots.lock().iter() {
            conn.close();
        }
    }
}

async fn drain_until_complete(
    pool: Arc<Pool>,
    conn: Arc<Connection>,
    txn_id: String,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<Result<Response, ClientError>>,
    out_tx: tokio::sync::mpsc::UnboundedSender<Result<Response, ClientError>>,
) {
    while let Some(item) = rx.recv().await {
        let is_terminal = matches!(&item, Ok(r) if r.txn_status == TxnStatus::Completed)
            || item.is_err();
        let _ = out_tx.send(item);
        if is_terminal {
            break;
        }
    }
    conn.retire(&txn_id);
    pool.slot_free.notify_one();
}

/// Convenience constructor matching the common case: one pool, the default
/// `/ping` GET used for health and reconnect decisions.
pub fn ping_request() -> Request {
    Request::new("/ping", Method::Get)
}

#[cfg(test)]
impl Pool {
    /// Builds a pool around already-constructed (possibly stubbed)
    /// connections, skipping the real dial and ping loop, for exercising
    /// `borrow`'s budget and round-robin logic in isolation.
    fn from_connections(config: ClientConfig, slots: Vec<Arc<Connection>>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Pool {
            config,
            slots: Mutex::new(slots),
            next: AtomicUsize::new(0),
            slot_free: Notify::new(),
            last_reconnect: Mutex::new(None),
            shutdown_tx,
            ping_task: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_in_flight_per_conn_is_at_least_one() {
        let cfg = ClientConfig::new("127.0.0.1:0").pool_size(8).max_in_flight(1);
        assert_eq!(cfg.max_in_flight_per_conn(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn borrow_skips_connections_over_the_in_flight_budget() {
        // pool_size=2, max_in_flight=2 -> budget of 1 per connection.
        let config = ClientConfig::new("127.0.0.1:0").pool_size(2).max_in_flight(2);
        assert_eq!(config.max_in_flight_per_conn(), 1);

        let saturated = Connection::stub("conn-a", 1);
        let free = Connection::stub("conn-b", 0);
        let pool = Pool::from_connections(config, vec![saturated.clone(), free.clone()]);

        let picked = pool.borrow().await.unwrap();
        assert_eq!(picked.addr(), free.addr());
    }

    #[tokio::test(start_paused = true)]
    async fn borrow_times_out_when_every_connection_is_saturated() {
        let config = ClientConfig::new("127.0.0.1:0")
            .pool_size(1)
            .max_in_flight(1)
            .borrow_timeout(Duration::from_millis(50));
        let busy = Connection::stub("conn-a", 1);
        let pool = Pool::from_connections(config, vec![busy]);

        let err = pool.borrow().await.unwrap_err();
        assert!(matches!(err, ClientError::PoolSaturated { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn borrow_wakes_up_once_a_slot_frees_even_under_the_timeout() {
        let config = ClientConfig::new("127.0.0.1:0")
            .pool_size(1)
            .max_in_flight(1)
            .borrow_timeout(Duration::from_secs(5));
        let busy = Connection::stub("conn-a", 1);
        let pool = Pool::from_connections(config, vec![busy.clone()]);

        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.borrow().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        busy.set_in_flight_count(0);
        pool.slot_free.notify_waiters();

        let picked = waiter.await.unwrap().unwrap();
        assert_eq!(picked.addr(), busy.addr());
    }

    #[test]
    fn reconnect_wait_saturates_instead_of_underflowing() {
        // `reconnect_slot` computes `reconnect_min_interval.saturating_sub(at.elapsed())`
        // against whatever real wall-clock time has passed since the last
        // reconnect; once that exceeds the min interval the wait must be
        // zero, not wrap around via unchecked subtraction.
        let min_interval = Duration::from_secs(5);
        let long_elapsed = Duration::from_secs(30);
        assert_eq!(min_interval.saturating_sub(long_elapsed), Duration::ZERO);

        let short_elapsed = Duration::from_millis(10);
        assert!(min_interval.saturating_sub(short_elapsed) > Duration::ZERO);
    }
}
