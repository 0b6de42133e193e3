//! The rebalance control protocol: router table exchange, partition
//! locking, checkins, and streaming data pulls, all served on control
//! URIs a [`strest_server::Router`] never hands to application handlers.
//!
//! Grounded on the original's `partition/partition.go`, whose constants
//! already use the `/__c/*` namespace this crate keeps — `manager.go`'s
//! client-side calls to `/chs/*` were the stale half of that original and
//! are not reproduced.

use std::sync::Arc;

use strest_protocol::{Method, Request, Response, TxnStatus};
use strest_server::{FnHandler, Router, ServerError, Txn};

use crate::manager::ShardManager;

pub const ROUTERTABLE_GET: &str = "/__c/rt/get";
pub const ROUTERTABLE_SET: &str = "/__c/rt/set";
pub const PARTITION_LOCK: &str = "/__c/pt/lock";
pub const PARTITION_UNLOCK: &str = "/__c/pt/unlock";
pub const PARTITION_DELETE: &str = "/__c/pt/delete";
pub const CHECKIN: &str = "/__c/checkin";
pub const DATA_PULL: &str = "/__c/data/pull";
pub const DATA_PUSH: &str = "/__c/data/push";

/// Registers every rebalance control endpoint on `router`, backed by `manager`.
pub async fn register(router: &Router, manager: Arc<ShardManager>) -> Result<(), ServerError> {
    let m = manager.clone();
    router
        .register_control(Method::Get, CHECKIN, Arc::new(FnHandler(move |_req, txn| checkin(m.clone(), txn))))
        .await?;

    let m = manager.clone();
    router
        .register_control(Method::Get, ROUTERTABLE_GET, Arc::new(FnHandler(move |_req, txn| get_router_table(m.clone(), txn))))
        .await?;

    let m = manager.clone();
    router
        .register_control(Method::Post, ROUTERTABLE_SET, Arc::new(FnHandler(move |req, txn| set_router_table(m.clone(), req, txn))))
        .await?;

    let m = manager.clone();
    router
        .register_control(Method::Post, PARTITION_LOCK, Arc::new(FnHandler(move |req, txn| lock(m.clone(), req, txn))))
        .await?;

    let m = manager.clone();
    router
        .register_control(Method::Post, PARTITION_UNLOCK, Arc::new(FnHandler(move |req, txn| unlock(m.clone(), req, txn))))
        .await?;

    let m = manager.clone();
    router
        .register_control(Method::Post, PARTITION_DELETE, Arc::new(FnHandler(move |req, txn| delete(m.clone(), req, txn))))
        .await?;

    let m = manager.clone();
    router
        .register_control(Method::Get, DATA_PULL, Arc::new(FnHandler(move |req, txn| data_pull(m.clone(), req, txn))))
        .await?;

    Ok(())
}

async fn checkin(manager: Arc<ShardManager>, txn: Txn) {
    let revision = manager.router_table().await.map(|t| t.revision).unwrap_or(0);
    let mut resp = Response::ok(txn.txn_id().to_string());
    resp.params.put("rt_revision", revision);
    resp.params.put("ts", chrono::Utc::now().to_rfc3339());
    let _ = txn.complete(resp).await;
}

async fn get_router_table(manager: Arc<ShardManager>, txn: Txn) {
    match manager.router_table().await {
        Ok(table) => {
            let mut resp = Response::ok(txn.txn_id().to_string());
            resp.params.put("router_table", table.to_dynmap());
            let _ = txn.complete(resp).await;
        }
        Err(err) => {
            let mut resp = Response::new(txn.txn_id().to_string(), 506);
            resp.status_message = err.to_string();
            let _ = txn.complete(resp).await;
        }
    }
}

async fn set_router_table(manager: Arc<ShardManager>, req: Request, txn: Txn) {
    let Some(rt_map) = req.params.get_dynmap("router_table") else {
        let mut resp = Response::new(txn.txn_id().to_string(), 406);
        resp.status_message = "No router_table".to_string();
        let _ = txn.complete(resp).await;
        return;
    };
    let outcome = match crate::router_table::RouterTable::from_dynmap(rt_map) {
        Ok(table) => manager.set_router_table(table).await.map(|_| ()),
        Err(err) => Err(err),
    };
    let resp = match outcome {
        Ok(()) => Response::ok(txn.txn_id().to_string()),
        Err(err) => {
            let mut resp = Response::new(txn.txn_id().to_string(), 406);
            resp.status_message = err.to_string();
            resp
        }
    };
    let _ = txn.complete(resp).await;
}

async fn lock(manager: Arc<ShardManager>, req: Request, txn: Txn) {
    toggle_lock(manager, req, txn, true).await;
}

async fn unlock(manager: Arc<ShardManager>, req: Request, txn: Txn) {
    toggle_lock(manager, req, txn, false).await;
}

async fn toggle_lock(manager: Arc<ShardManager>, req: Request, txn: Txn, lock: bool) {
    let Some(partition) = req.params.get_i64("partition") else {
        let mut resp = Response::new(txn.txn_id().to_string(), 406);
        resp.status_message = "partition param missing".to_string();
        let _ = txn.complete(resp).await;
        return;
    };
    if lock {
        manager.lock_partition(partition as usize).await;
    } else {
        manager.unlock_partition(partition as usize).await;
    }
    let _ = txn.complete(Response::ok(txn.txn_id().to_string())).await;
}

/// Drops local ownership of a partition: unlocks it and evicts its data via
/// the registered [`crate::partitioner::Partitioner`].
async fn delete(manager: Arc<ShardManager>, req: Request, txn: Txn) {
    let Some(partition) = req.params.get_i64("partition") else {
        let mut resp = Response::new(txn.txn_id().to_string(), 406);
        resp.status_message = "partition param missing".to_string();
        let _ = txn.complete(resp).await;
        return;
    };
    let partition = partition as usize;
    manager.unlock_partition(partition).await;
    manager.partitioner().delete_data(partition);
    let _ = txn.complete(Response::ok(txn.txn_id().to_string())).await;
}

async fn data_pull(manager: Arc<ShardManager>, req: Request, txn: Txn) {
    let Some(partition) = req.params.get_i64("partition") else {
        let mut resp = Response::new(txn.txn_id().to_string(), 406);
        resp.status_message = "partition param is mandatory".to_string();
        let _ = txn.complete(resp).await;
        return;
    };
    let remove = req.params.get_i64("remove").map(|v| v != 0).unwrap_or(false);
    let partitioner = manager.partitioner();
    let (tx, mut rx) = tokio::sync::mpsc::channel(10);

    let partition = partition as usize;
    tokio::spawn(async move {
        if let Err(err) = partitioner.data(partition, remove, tx).await {
            tracing::warn!(partition, %err, "data pull failed");
        }
    });

    while let Some(item) = rx.recv().await {
        let mut resp = Response::new(txn.txn_id().to_string(), 200);
        resp.txn_status = TxnStatus::Continue;
        resp.params.put("data", item);
        if txn.send_continue(resp).await.is_err() {
            return;
        }
    }
    let _ = txn.complete(Response::ok(txn.txn_id().to_string())).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::Partitioner;
    use std::path::PathBuf;
    use strest_protocol::TxnAccept;
    use strest_types::DynMap;
    use tokio::sync::mpsc;

    /// A `Partitioner` that streams a fixed handful of rows for one
    /// partition and nothing for any other, exercising the multi-response
    /// `data_pull` path end to end.
    #[derive(Debug, Default)]
    struct RowPartitioner;

    #[async_trait::async_trait]
    impl Partitioner for RowPartitioner {
        async fn data(&self, partition: usize, _remove: bool, tx: mpsc::Sender<DynMap>) -> Result<(), ShardError> {
            if partition == 2 {
                for i in 0..3 {
                    let mut row = DynMap::new();
                    row.put("row", i as i64);
                    if tx.send(row).await.is_err() {
                        break;
                    }
                }
            }
            Ok(())
        }

        fn set_data(&self, _partition: usize, _data: DynMap) {}
        fn delete_data(&self, _partition: usize) {}
    }

    fn manager_with(partitioner: Arc<dyn Partitioner>) -> Arc<ShardManager> {
        Arc::new(ShardManager::new("svc", "self:1", None::<PathBuf>, partitioner))
    }

    #[tokio::test]
    async fn data_pull_streams_one_continue_per_row_then_completes() {
        let manager = manager_with(Arc::new(RowPartitioner));
        let mut req = Request::new(DATA_PULL, Method::Get);
        req.params.put("partition", 2i64);

        let (txn, mut rx) = Txn::new("t1".into(), TxnAccept::Multi);
        data_pull(manager, req, txn).await;

        let mut rows = Vec::new();
        let mut saw_completed = false;
        while let Some(resp) = rx.recv().await {
            match resp.txn_status {
                TxnStatus::Continue => rows.push(resp.params.get_i64("data.row").unwrap()),
                TxnStatus::Completed => {
                    saw_completed = true;
                    break;
                }
            }
        }
        assert_eq!(rows, vec![0, 1, 2]);
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn data_pull_with_no_rows_completes_immediately() {
        let manager = manager_with(Arc::new(RowPartitioner));
        let mut req = Request::new(DATA_PULL, Method::Get);
        req.params.put("partition", 0i64);

        let (txn, mut rx) = Txn::new("t2".into(), TxnAccept::Multi);
        data_pull(manager, req, txn).await;

        let resp = rx.recv().await.unwrap();
        assert_eq!(resp.txn_status, TxnStatus::Completed);
    }

    #[tokio::test]
    async fn delete_unlocks_and_evicts_partition_data() {
        let manager = manager_with(Arc::new(RowPartitioner));
        manager.lock_partition(2).await;

        let mut req = Request::new(PARTITION_DELETE, Method::Post);
        req.params.put("partition", 2i64);

        let (txn, mut rx) = Txn::new("t4".into(), TxnAccept::Single);
        delete(manager.clone(), req, txn).await;

        let resp = rx.recv().await.unwrap();
        assert_eq!(resp.status_code, 200);
        let (_, locked) = manager.my_responsibility(2).await;
        assert!(!locked);
    }

    #[tokio::test]
    async fn delete_rejects_missing_partition() {
        let manager = manager_with(Arc::new(RowPartitioner));
        let req = Request::new(PARTITION_DELETE, Method::Post);

        let (txn, mut rx) = Txn::new("t5".into(), TxnAccept::Single);
        delete(manager, req, txn).await;

        let resp = rx.recv().await.unwrap();
        assert_eq!(resp.status_code, 406);
    }

    #[tokio::test]
    async fn data_pull_rejects_missing_partition() {
        let manager = manager_with(Arc::new(RowPartitioner));
        let req = Request::new(DATA_PULL, Method::Get);

        let (txn, mut rx) = Txn::new("t3".into(), TxnAccept::Single);
        data_pull(manager, req, txn).await;

        let resp = rx.recv().await.unwrap();
        assert_eq!(resp.status_code, 406);
    }
}
