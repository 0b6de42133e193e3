//! Error type for router tables and the shard manager.

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ShardError {
    #[error("router table dynmap is missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("partition {partition} is out of bounds (total_partitions={total})")]
    PartitionOutOfBounds { partition: usize, total: usize },

    #[error("router table has unaccounted-for partitions: {accounted}/{total} assigned")]
    IncompleteCoverage { accounted: usize, total: usize },

    #[error("rejecting router table revision {new} which is not newer than current revision {current}")]
    StaleRevision { current: i64, new: i64 },

    #[error("no router table is loaded yet")]
    NoTable,

    #[error("no seed endpoint returned a usable router table")]
    NoSeedSucceeded,

    #[error("reading or writing the persisted router table failed")]
    Persistence(#[from] std::io::Error),

    #[error("router table JSON was malformed")]
    Json(#[from] serde_json::Error),

    #[error("bootstrap HTTP request failed")]
    Http(#[from] reqwest::Error),

    #[error("client error talking to a shard peer")]
    Client(#[from] strest_client::ClientError),

    #[error("failed to register a rebalance control route")]
    ControlRegistration(#[from] strest_server::ServerError),
}
