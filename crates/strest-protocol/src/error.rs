use thiserror::Error;

/// Errors raised while encoding or decoding STREST requests/responses, over
/// either the JSON or binary wire format.
///
/// Mirrors the shape of the transport-layer error enums in the corpus:
/// `#[non_exhaustive]`, one variant per failure mode, actionable messages.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A length prefix on the wire was negative. The original decoder
    /// rejects these before attempting any allocation.
    #[error("malformed frame: length prefix {length} is negative")]
    NegativeLength { length: i64 },

    /// A length-prefixed field declared a size larger than the configured
    /// limit; rejected before the buffer is allocated to bound memory use
    /// from a malicious or corrupt peer.
    #[error("frame field of {size} bytes exceeds the maximum allowed size of {max} bytes")]
    FieldTooLarge { size: usize, max: usize },

    /// A wire-id byte did not match any entry in `table`.
    #[error("unknown wire id {id} for table {table}")]
    UnknownWireId { table: &'static str, id: i8 },

    /// A wire-name string did not match any entry in `table`.
    #[error("unknown wire name \"{name}\" for table {table}")]
    UnknownWireName { table: &'static str, name: String },

    /// The connection closed or the underlying reader returned EOF before a
    /// complete frame could be read.
    #[error("connection closed while reading a frame")]
    UnexpectedEof,

    #[error("failed to decode JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to decode msgpack payload: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    #[error("failed to encode msgpack payload: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("unsupported param encoding: {0:?}")]
    UnsupportedParamEncoding(crate::wire::ParamEncoding),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The envelope was well-formed JSON but was missing a field required
    /// by the STREST envelope shape (e.g. a request with no `strest.uri`).
    #[error("invalid STREST envelope: missing or malformed field \"{field}\"")]
    InvalidEnvelope { field: &'static str },
}
