//! Error type for the client pool and its connections.

use strest_protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("connection closed before a response was received")]
    ConnectionClosed,

    #[error("no connection slot became free within {waited_ms}ms (pool saturated)")]
    PoolSaturated { waited_ms: u64 },

    #[error("ping to {addr} timed out after {timeout_ms}ms")]
    PingTimeout { addr: String, timeout_ms: u64 },

    #[error("client is shutting down")]
    ShuttingDown,

    #[error("wire protocol error")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error talking to the server")]
    Io(#[from] std::io::Error),
}
