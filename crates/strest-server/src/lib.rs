//! STREST server: a method-scoped, longest-prefix-match URI [`Router`],
//! transaction handles ([`Txn`]) honoring the single/multi accept
//! invariants, and three transports (JSON socket, binary socket, HTTP)
//! built on top of the same dispatch path.
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

pub mod config;
pub mod control;
mod dispatch;
mod error;
pub mod filter;
pub mod handler;
pub mod router;
mod server;
pub mod transport;
pub mod txn;

pub use config::ServerConfig;
pub use error::ServerError;
pub use filter::{Filter, FilterChain};
pub use handler::{FnHandler, Handler};
pub use router::Router;
pub use server::Server;
pub use txn::Txn;
