//! `ShardManager`: owns the current [`RouterTable`], the client pools to
//! every other entry, local partition locks, and disk persistence.
//!
//! Grounded on the original's `partition/manager.go` `Manager`, with two
//! deliberate deviations from the original's behavior: `bootstrap_seed`
//! treats the first *successful* response as the winner (the original's
//! `NewManagerSeed` had its success check inverted), and
//! `my_responsibility` computes partition membership with a single lock
//! acquisition instead of calling back into a second lock-acquiring method
//! while the first guard is still held.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use strest_client::{ClientConfig, Pool};
use strest_protocol::Method;
use strest_types::DynMap;
use tokio::sync::RwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::ShardConfig;
use crate::error::ShardError;
use crate::partitioner::Partitioner;
use crate::router_table::RouterTable;

pub struct ShardManager {
    service_name: String,
    my_entry_id: String,
    data_dir: Option<PathBuf>,
    table: RwLock<Option<Arc<RouterTable>>>,
    connections: RwLock<HashMap<String, Arc<Pool>>>,
    locked_partitions: AsyncMutex<HashSet<usize>>,
    partitioner: Arc<dyn Partitioner>,
}

impl std::fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("service_name", &self.service_name)
            .field("my_entry_id", &self.my_entry_id)
            .finish_non_exhaustive()
    }
}

impl ShardManager {
    /// Builds a manager with no router table loaded; callers should follow
    /// up with [`ShardManager::load`] or [`ShardManager::bootstrap_seed`].
    pub fn new(
        service_name: impl Into<String>,
        my_entry_id: impl Into<String>,
        data_dir: Option<PathBuf>,
        partitioner: Arc<dyn Partitioner>,
    ) -> Self {
        ShardManager {
            service_name: service_name.into(),
            my_entry_id: my_entry_id.into(),
            data_dir,
            table: RwLock::new(None),
            connections: RwLock::new(HashMap::new()),
            locked_partitions: AsyncMutex::new(HashSet::new()),
            partitioner,
        }
    }

    /// Builds a manager from a [`ShardConfig`], the bundled-fields
    /// equivalent of [`ShardManager::new`]'s four positional arguments.
    pub fn from_config(config: ShardConfig, partitioner: Arc<dyn Partitioner>) -> Self {
        ShardManager::new(config.service_name, config.my_entry_id, config.data_dir, partitioner)
    }

    fn filename(&self) -> PathBuf {
        let name = format!("{}.routertable", self.service_name);
        match &self.data_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Loads a persisted router table from disk, if one exists.
    pub async fn load(&self) -> Result<(), ShardError> {
        let bytes = tokio::fs::read(self.filename()).await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        let mp: DynMap = serde_json::from_value(value)?;
        let table = RouterTable::from_dynmap(&mp)?;
        self.set_router_table(table).await?;
        Ok(())
    }

    async fn save(&self) -> Result<(), ShardError> {
        let table = self.table.read().await;
        if let Some(table) = table.as_ref() {
            let json = serde_json::to_value(table.to_dynmap())?;
            let bytes = serde_json::to_vec_pretty(&json)?;
            tokio::fs::write(self.filename(), bytes).await?;
        }
        Ok(())
    }

    /// Tries each seed HTTP endpoint's `/__c/rt/get` in order, adopting the
    /// table from the first that answers successfully.
    pub async fn bootstrap_seed(&self, seed_http_urls: &[String]) -> Result<(), ShardError> {
        for url in seed_http_urls {
            match request_router_table_http(url).await {
                Ok(table) => {
                    self.set_router_table(table).await?;
                    return Ok(());
                }
                Err(err) => tracing::warn!(%url, %err, "seed did not return a usable router table"),
            }
        }
        Err(ShardError::NoSeedSucceeded)
    }

    /// Replaces the current table, rejecting revisions that are not
    /// strictly newer, diffing client pools (new entries get a lazily
    /// usable pool, removed entries are shut down), and persisting the
    /// result to disk.
    pub async fn set_router_table(&self, mut new_table: RouterTable) -> Result<Option<Arc<RouterTable>>, ShardError> {
        {
            let current = self.table.read().await;
            if let Some(current) = current.as_ref() {
                if current.revision >= new_table.revision {
                    return Err(ShardError::StaleRevision {
                        current: current.revision,
                        new: new_table.revision,
                    });
                }
            }
        }
        new_table = new_table.with_self(&self.my_entry_id);

        let mut fresh_connections = HashMap::new();
        {
            let mut existing = self.connections.write().await;
            for entry in &new_table.entries {
                let key = entry.id();
                if key == self.my_entry_id {
                    continue;
                }
                let pool = match existing.remove(&key) {
                    Some(pool) => pool,
                    None => {
                        let addr = format!("{}:{}", entry.address, entry.json_port);
                        match Pool::connect(ClientConfig::new(addr)).await {
                            Ok(pool) => pool,
                            Err(err) => {
                                tracing::warn!(entry = %key, %err, "could not connect to new router entry yet");
                                continue;
                            }
                        }
                    }
                };
                fresh_connections.insert(key, pool);
            }
            for (_, stale) in existing.drain() {
                stale.shutdown();
            }
            *existing = fresh_connections;
        }

        let new_table = Arc::new(new_table);
        let old = self.table.write().await.replace(new_table);
        self.save().await?;
        Ok(old)
    }

    pub async fn router_table(&self) -> Result<Arc<RouterTable>, ShardError> {
        self.table.read().await.clone().ok_or(ShardError::NoTable)
    }

    pub async fn my_partitions(&self) -> HashSet<usize> {
        match self.table.read().await.as_ref() {
            Some(table) => table.my_partitions(),
            None => HashSet::new(),
        }
    }

    /// Returns `(is_mine, is_locked)` for `partition`, computed under one
    /// lock acquisition each (see module docs on the original's deadlock bug).
    pub async fn my_responsibility(&self, partition: usize) -> (bool, bool) {
        let is_mine = match self.table.read().await.as_ref() {
            Some(table) => table.my_partitions().contains(&partition),
            None => false,
        };
        let is_locked = self.locked_partitions.lock().await.contains(&partition);
        (is_mine, is_locked)
    }

    pub async fn lock_partition(&self, partition: usize) {
        self.locked_partitions.lock().await.insert(partition);
    }

    pub async fn unlock_partition(&self, partition: usize) {
        self.locked_partitions.lock().await.remove(&partition);
    }

    pub async fn clients(&self, partition: usize) -> Result<Vec<Arc<Pool>>, ShardError> {
        let table = self.router_table().await?;
        let entries = table.partition_entries(partition)?;
        let connections = self.connections.read().await;
        let mut clients = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.id() == self.my_entry_id {
                continue;
            }
            if let Some(pool) = connections.get(&entry.id()) {
                clients.push(pool.clone());
            } else {
                tracing::warn!(entry = %entry.id(), "no connection found for router entry");
            }
        }
        Ok(clients)
    }

    /// Does a checkin with `pool`, returning the peer's router table
    /// revision, matching the original's `Checkin`.
    pub async fn checkin(&self, pool: &Pool) -> Result<i64, ShardError> {
        let req = strest_protocol::Request::new(crate::control::CHECKIN, Method::Get);
        let resp = pool.call(req).await?;
        Ok(resp.params.get_i64("rt_revision").unwrap_or(0))
    }

    /// Requests a fresh router table from `pool` without adopting it;
    /// callers decide whether to pass the result to `set_router_table`.
    pub async fn request_router_table(&self, pool: &Pool) -> Result<RouterTable, ShardError> {
        let req = strest_protocol::Request::new(crate::control::ROUTERTABLE_GET, Method::Get);
        let resp = pool.call(req).await?;
        let mp = resp
            .params
            .get_dynmap("router_table")
            .ok_or(ShardError::MissingField { field: "router_table" })?;
        Ok(RouterTable::from_dynmap(mp)?)
    }

    pub fn partitioner(&self) -> Arc<dyn Partitioner> {
        self.partitioner.clone()
    }
}

async fn request_router_table_http(seed_url: &str) -> Result<RouterTable, ShardError> {
    let url = format!("{}{}", seed_url.trim_end_matches('/'), crate::control::ROUTERTABLE_GET);
    let resp = reqwest::get(&url).await?.error_for_status()?;
    let json: serde_json::Value = resp.json().await?;
    let mp: DynMap = serde_json::from_value(json)?;
    let rt_map = mp
        .get_dynmap("router_table")
        .ok_or(ShardError::MissingField { field: "router_table" })?;
    Ok(RouterTable::from_dynmap(rt_map)?)
}
