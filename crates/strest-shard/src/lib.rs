//! Sharded routing for STREST services: a replica-aware [`RouterTable`],
//! the [`ShardManager`] that owns it and the client pools to every peer,
//! and the `/__c/*` rebalance control protocol served alongside
//! application routes.
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

pub mod control;
mod config;
mod error;
mod manager;
mod partitioner;
mod router_table;

pub use config::ShardConfig;
pub use error::ShardError;
pub use manager::ShardManager;
pub use partitioner::{NullPartitioner, Partitioner};
pub use router_table::{RouterEntry, RouterTable};
