//! STREST wire protocols.
//!
//! This crate defines the [`Request`]/[`Response`] transaction model and two
//! codecs over it: a human-readable JSON envelope (`json` module) and a
//! compact length-prefixed binary frame format (`binary` module), plus the
//! fixed wire-id enumerations (`wire` module) both codecs share.
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

pub mod binary;
mod envelope;
mod error;
pub mod json;
pub mod wire;

pub use envelope::{new_txn_id, Request, Response, ShardRequest, STREST_VERSION};
pub use error::ProtocolError;
pub use wire::{ContentEncoding, Method, ParamEncoding, TxnAccept, TxnStatus};
