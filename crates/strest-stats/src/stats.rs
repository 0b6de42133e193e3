//! `Stats`: a handle to a background task that owns every tracked
//! timeframe's current bucket, serializing all reads and writes through a
//! single task the way the original's `eventLoop` goroutine does.
//!
//! Ported from `stats/stats.go`. `Set`/`Inc` become fire-and-forget channel
//! sends (dropped with a warning if the actor's inbox is full, matching the
//! original's non-blocking `select`/`default`), and `Get` becomes a
//! request/response round trip over a `oneshot` channel instead of a second
//! dedicated channel type.

use std::collections::HashMap;

use chrono::Utc;
use strest_types::DynMap;
use tokio::sync::{mpsc, oneshot};

use crate::error::StatsError;
use crate::timeamount::TimeAmount;

/// Hook invoked whenever a timeframe's bucket rolls over, so the
/// now-final values can be shipped off before being overwritten.
#[async_trait::async_trait]
pub trait Persister: Send + Sync {
    async fn persist(&self, time_amount: TimeAmount, epoch: i64, values: DynMap);
}

/// A `Persister` that only logs, for services that don't need durable
/// stats history.
#[derive(Debug, Default)]
pub struct LoggingPersister;

#[async_trait::async_trait]
impl Persister for LoggingPersister {
    async fn persist(&self, time_amount: TimeAmount, epoch: i64, values: DynMap) {
        tracing::info!(%time_amount, epoch, ?values, "stats bucket rolled over");
    }
}

#[derive(Debug, Clone)]
pub struct StatsSave {
    pub epoch: i64,
    pub time_amount: TimeAmount,
    pub values: DynMap,
}

enum Command {
    Set { key: String, val: i64 },
    Inc { key: String, val: i64 },
    Get { reply: oneshot::Sender<HashMap<TimeAmount, StatsSave>> },
}

/// A live stats tracker. Cloning shares the same background task; dropping
/// every clone lets the actor's inbox close and the task exit.
#[derive(Debug, Clone)]
pub struct Stats {
    sender: mpsc::Sender<Command>,
}

impl Stats {
    /// Starts tracking the given time amounts (e.g. `"1 minute"`,
    /// `"30 minute"`, `"1 day"`) immediately; the background task is
    /// spawned as part of construction, matching `New` + `Start` combined.
    pub fn new(time_amounts: &[&str], persister: std::sync::Arc<dyn Persister>) -> Result<Self, StatsError> {
        let mut parsed = Vec::with_capacity(time_amounts.len());
        for ta in time_amounts {
            parsed.push(TimeAmount::parse(ta)?);
        }
        let (sender, receiver) = mpsc::channel(500);
        tokio::spawn(run(parsed, persister, receiver));
        Ok(Stats { sender })
    }

    /// Overwrites `key`'s value in every tracked bucket. Dropped with a
    /// warning if the actor's inbox is momentarily full, matching the
    /// original's non-blocking send.
    pub fn set(&self, key: impl Into<String>, val: i64) {
        let key = key.into();
        if self.sender.try_send(Command::Set { key: key.clone(), val }).is_err() {
            tracing::warn!(key, val, "could not set stats key, actor inbox full or gone");
        }
    }

    pub fn inc(&self, key: impl Into<String>, val: i64) {
        let key = key.into();
        if self.sender.try_send(Command::Inc { key: key.clone(), val }).is_err() {
            tracing::warn!(key, val, "could not inc stats key, actor inbox full or gone");
        }
    }

    /// Snapshots every tracked bucket's current values.
    pub async fn get(&self) -> Result<HashMap<TimeAmount, StatsSave>, StatsError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(Command::Get { reply })
            .await
            .map_err(|_| StatsError::ActorGone)?;
        rx.await.map_err(|_| StatsError::ActorGone)
    }
}

async fn run(time_amounts: Vec<TimeAmount>, persister: std::sync::Arc<dyn Persister>, mut receiver: mpsc::Receiver<Command>) {
    let mut buckets: HashMap<TimeAmount, StatsSave> = time_amounts
        .into_iter()
        .map(|ta| {
            let epoch = ta.to_trendrr_epoch(Utc::now());
            (
                ta,
                StatsSave {
                    epoch,
                    time_amount: ta,
                    values: DynMap::new(),
                },
            )
        })
        .collect();

    while let Some(cmd) = receiver.recv().await {
        match cmd {
            Command::Set { key, val } => apply(&mut buckets, &persister, &key, val, false).await,
            Command::Inc { key, val } => apply(&mut buckets, &persister, &key, val, true).await,
            Command::Get { reply } => {
                let _ = reply.send(buckets.clone());
            }
        }
    }
}

async fn apply(
    buckets: &mut HashMap<TimeAmount, StatsSave>,
    persister: &std::sync::Arc<dyn Persister>,
    key: &str,
    val: i64,
    increment: bool,
) {
    let now = Utc::now();
    for (ta, save) in buckets.iter_mut() {
        let epoch = ta.to_trendrr_epoch(now);
        if epoch != save.epoch {
            persister.persist(save.time_amount, save.epoch, save.values.clone()).await;
            save.epoch = epoch;
            save.values = DynMap::new();
        }
        if increment {
            let current = save.values.get_i64(key).unwrap_or(0);
            let _ = save.values.put_dotted(key, current + val);
        } else {
            let _ = save.values.put_dotted(key, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inc_accumulates_within_a_bucket() {
        let stats = Stats::new(&["1 day"], std::sync::Arc::new(LoggingPersister)).unwrap();
        stats.inc("requests", 3);
        stats.inc("requests", 4);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let snapshot = stats.get().await.unwrap();
        let ta = TimeAmount::parse("1 day").unwrap();
        assert_eq!(snapshot[&ta].values.get_i64("requests"), Some(7));
    }

    #[tokio::test]
    async fn set_overwrites_rather_than_accumulating() {
        let stats = Stats::new(&["1 minute"], std::sync::Arc::new(LoggingPersister)).unwrap();
        stats.set("gauge", 10);
        stats.set("gauge", 20);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let snapshot = stats.get().await.unwrap();
        let ta = TimeAmount::parse("1 minute").unwrap();
        assert_eq!(snapshot[&ta].values.get_i64("gauge"), Some(20));
    }

    #[tokio::test]
    async fn rejects_unparseable_time_amount() {
        assert!(Stats::new(&["1 fortnight"], std::sync::Arc::new(LoggingPersister)).is_err());
    }
}
