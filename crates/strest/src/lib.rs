//! STREST: re-exports every sub-crate under one name, plus a couple of
//! small wiring helpers (`tracing` init, a server+shard bootstrap) that a
//! standalone service built on this crate would otherwise have to repeat.
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

pub mod types {
    pub use strest_types::*;
}

pub mod protocol {
    pub use strest_protocol::*;
}

pub mod server {
    pub use strest_server::*;
}

pub mod client {
    pub use strest_client::*;
}

pub mod shard {
    pub use strest_shard::*;
}

pub mod stats {
    pub use strest_stats::*;
}

mod bootstrap;

pub use bootstrap::{init_tracing, ShardedService, ShardedServiceConfig};
