//! Wiring helpers: a `tracing` init matching the teacher crates' standard
//! env-filter setup, and a small convenience that wires a [`strest_server::Server`]
//! together with a [`strest_shard::ShardManager`] and its control routes.

use std::sync::Arc;

use strest_server::{Server, ServerConfig};
use strest_shard::{NullPartitioner, Partitioner, ShardConfig, ShardManager};

/// Initializes a `tracing` subscriber from `RUST_LOG` (defaulting to
/// `info`), matching the env-filter + fmt setup used throughout this
/// workspace's teacher crates.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[derive(Debug, Clone)]
pub struct ShardedServiceConfig {
    pub server: ServerConfig,
    pub shard: ShardConfig,
}

impl ShardedServiceConfig {
    pub fn new(service_name: impl Into<String>, my_entry_id: impl Into<String>) -> Self {
        ShardedServiceConfig {
            server: ServerConfig::default(),
            shard: ShardConfig::new(service_name, my_entry_id),
        }
    }
}

/// A server wired up with sharded routing: the control routes are
/// registered on the same [`strest_server::Router`] the application's own
/// handlers register against.
#[derive(Debug)]
pub struct ShardedService {
    pub server: Server,
    pub shard_manager: Arc<ShardManager>,
}

impl ShardedService {
    /// Builds the service, loading a persisted router table from disk if
    /// one exists, then falling back to the seed HTTP endpoints.
    pub async fn bootstrap(config: ShardedServiceConfig, partitioner: Arc<dyn Partitioner>) -> Result<Self, strest_shard::ShardError> {
        let server = Server::new(config.server);
        let seed_http_urls = config.shard.seed_http_urls.clone();
        let shard_manager = Arc::new(ShardManager::from_config(config.shard, partitioner));

        if shard_manager.load().await.is_err() && !seed_http_urls.is_empty() {
            shard_manager.bootstrap_seed(&seed_http_urls).await?;
        }

        let router = server.router();
        strest_shard::control::register(&router, shard_manager.clone()).await?;

        Ok(ShardedService { server, shard_manager })
    }

    /// Builds the service with no data migration hook, for services that
    /// only need partition ownership and routing, not local data movement.
    pub async fn bootstrap_without_partitioner(config: ShardedServiceConfig) -> Result<Self, strest_shard::ShardError> {
        Self::bootstrap(config, Arc::new(NullPartitioner)).await
    }

    pub async fn run(&self) -> Result<(), strest_server::ServerError> {
        self.server.run().await
    }
}
