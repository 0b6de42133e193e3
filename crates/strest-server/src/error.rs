use thiserror::Error;

/// Server-side errors, covering router registration, transaction
/// lifecycle, and transport I/O.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServerError {
    #[error("pattern \"{pattern}\" is empty")]
    EmptyPattern { pattern: String },

    #[error("multiple registrations for {method:?} \"{pattern}\"")]
    DuplicateRegistration { method: strest_protocol::Method, pattern: String },

    #[error("\"{pattern}\" is a reserved control URI and cannot be registered by application code")]
    ReservedUri { pattern: String },

    #[error("transaction \"{txn_id}\" already received its terminal response")]
    TxnAlreadyComplete { txn_id: String },

    #[error("connection closed before the response could be written")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] strest_protocol::ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
