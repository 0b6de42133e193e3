//! The pluggable data-migration hook a [`crate::manager::ShardManager`]
//! calls into during `/__c/data/pull` streaming and local partition
//! ownership changes.
//!
//! Grounded on the original's `Partitioner` interface (`partition/manager.go`):
//! `Data`/`SetData`/`DeleteData` become async trait methods, and the
//! original's three-channel fan-out (`dataChan`/`finishedChan`/`errorChan`)
//! becomes a single `mpsc::Sender<DynMap>` the implementor drains until it
//! closes, matching how Tokio channels already signal completion.

use strest_types::DynMap;
use tokio::sync::mpsc;

use crate::error::ShardError;

#[async_trait::async_trait]
pub trait Partitioner: Send + Sync {
    /// Streams every item owned by `partition` onto `tx`, dropping `tx`
    /// when done. If `remove` is set the partitioner should also evict
    /// the data locally once it has been streamed out.
    async fn data(&self, partition: usize, remove: bool, tx: mpsc::Sender<DynMap>) -> Result<(), ShardError>;

    /// Imports one data item into `partition`, overwriting any existing
    /// value at the item's key.
    fn set_data(&self, partition: usize, data: DynMap);

    /// Deletes every item belonging to `partition`.
    fn delete_data(&self, partition: usize);
}

/// A `Partitioner` that logs and otherwise does nothing, for services that
/// only need partition ownership/routing without migratable local data.
#[derive(Debug, Default)]
pub struct NullPartitioner;

#[async_trait::async_trait]
impl Partitioner for NullPartitioner {
    async fn data(&self, partition: usize, remove: bool, _tx: mpsc::Sender<DynMap>) -> Result<(), ShardError> {
        tracing::debug!(partition, remove, "NullPartitioner ignoring data pull request");
        Ok(())
    }

    fn set_data(&self, partition: usize, _data: DynMap) {
        tracing::debug!(partition, "NullPartitioner ignoring set_data");
    }

    fn delete_data(&self, partition: usize) {
        tracing::debug!(partition, "NullPartitioner ignoring delete_data");
    }
}
