//! STREST client: a fixed-size, ping-supervised connection pool over the
//! binary transport.
//!
//! Grounded on the original client's `pool.go`/`connection.go`; the reader
//! goroutine becomes a reader task demuxing responses by `txn_id`, the
//! event loop becomes a writer task draining an outbound channel, and the
//! condition-variable borrow wait becomes an async `Notify`.
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

mod config;
mod connection;
mod error;
mod pool;

pub use config::ClientConfig;
pub use error::ClientError;
pub use pool::{ping_request, Pool};
