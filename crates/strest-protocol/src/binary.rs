//! The length-prefixed binary frame format, byte-for-byte ported from
//! `cheshire/protocol_bin.go`. All integers are big-endian. A length prefix
//! is an `i16` unless the field is `params` or `content`, which use `i32`.
//! A negative length is rejected before any allocation.

use bytes::{BufMut, BytesMut};
use strest_types::DynMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::envelope::{Request, Response, ShardRequest};
use crate::error::ProtocolError;
use crate::wire::{ContentEncoding, Method, ParamEncoding, TxnAccept, TxnStatus};

/// Caps how large a single length-prefixed field is allowed to declare
/// itself before we allocate a buffer for it, guarding against a malicious
/// or corrupt peer claiming a multi-gigabyte field.
const MAX_FIELD_LEN: usize = 64 * 1024 * 1024;

fn put_i16_string(buf: &mut BytesMut, s: &str) {
    buf.put_i16(s.len() as i16);
    buf.put_slice(s.as_bytes());
}

fn put_i32_bytes(buf: &mut BytesMut, b: &[u8]) {
    buf.put_i32(b.len() as i32);
    buf.put_slice(b);
}

async fn read_i16_string<R: AsyncRead + Unpin>(r: &mut R) -> Result<String, ProtocolError> {
    let len = r.read_i16().await?;
    if len < 0 {
        return Err(ProtocolError::NegativeLength { length: len as i64 });
    }
    let len = len as usize;
    if len > MAX_FIELD_LEN {
        return Err(ProtocolError::FieldTooLarge { size: len, max: MAX_FIELD_LEN });
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn read_i32_bytes<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let len = r.read_i32().await?;
    if len < 0 {
        return Err(ProtocolError::NegativeLength { length: len as i64 });
    }
    let len = len as usize;
    if len > MAX_FIELD_LEN {
        return Err(ProtocolError::FieldTooLarge { size: len, max: MAX_FIELD_LEN });
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

fn encode_params(encoding: ParamEncoding, params: &DynMap) -> Result<Vec<u8>, ProtocolError> {
    match encoding {
        ParamEncoding::Json => Ok(serde_json::to_vec(params)?),
        ParamEncoding::MsgPack => Ok(rmp_serde::to_vec(params)?),
    }
}

fn decode_params(encoding: ParamEncoding, bytes: &[u8]) -> Result<DynMap, ProtocolError> {
    if bytes.is_empty() {
        return Ok(DynMap::new());
    }
    match encoding {
        ParamEncoding::Json => Ok(serde_json::from_slice(bytes)?),
        ParamEncoding::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
    }
}

fn put_shard(buf: &mut BytesMut, shard: &ShardRequest) {
    buf.put_i16(shard.partition as i16);
    put_i16_string(buf, &shard.key);
    buf.put_i64(shard.revision);
}

async fn read_shard<R: AsyncRead + Unpin>(r: &mut R) -> Result<ShardRequest, ProtocolError> {
    let partition = r.read_i16().await? as i32;
    let key = read_i16_string(r).await?;
    let revision = r.read_i64().await?;
    Ok(ShardRequest { partition, key, revision })
}

/// Encodes the `Hello` frame sent at the start of a binary connection: an
/// `i8` encoding selector (always `json`, matching the original
/// `WriteHello`) followed by a length-prefixed JSON object.
pub fn encode_hello(hello: &DynMap) -> Result<Vec<u8>, ProtocolError> {
    let mut hello = hello.clone();
    hello.put_if_absent("v", crate::envelope::STREST_VERSION);
    hello.put_if_absent("useragent", "strest-rust");
    let mut buf = BytesMut::new();
    buf.put_i8(ParamEncoding::Json.wire_id());
    put_i16_string(&mut buf, &serde_json::to_string(&hello)?);
    Ok(buf.to_vec())
}

pub async fn decode_hello<R: AsyncRead + Unpin>(r: &mut R) -> Result<DynMap, ProtocolError> {
    let encoding_id = r.read_i8().await?;
    let _encoding = ParamEncoding::from_wire_id(encoding_id)?;
    let json = read_i16_string(r).await?;
    Ok(serde_json::from_str(&json)?)
}

pub fn encode_request(req: &Request) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = BytesMut::new();
    put_shard(&mut buf, &req.shard);
    put_i16_string(&mut buf, &req.txn_id);
    buf.put_i8(req.txn_accept.wire_id());
    buf.put_i8(req.method.wire_id());
    put_i16_string(&mut buf, &req.uri);
    buf.put_i8(req.param_encoding.wire_id());
    let params_bytes = encode_params(req.param_encoding, &req.params)?;
    put_i32_bytes(&mut buf, &params_bytes);
    buf.put_i8(req.content_encoding.wire_id());
    put_i32_bytes(&mut buf, &req.content);
    Ok(buf.to_vec())
}

pub async fn decode_request<R: AsyncRead + Unpin>(r: &mut R) -> Result<Request, ProtocolError> {
    let shard = read_shard(r).await?;
    let txn_id = read_i16_string(r).await?;
    let txn_accept = TxnAccept::from_wire_id(r.read_i8().await?)?;
    let method = Method::from_wire_id(r.read_i8().await?)?;
    let uri = read_i16_string(r).await?;
    let param_encoding = ParamEncoding::from_wire_id(r.read_i8().await?)?;
    let params_bytes = read_i32_bytes(r).await?;
    let params = decode_params(param_encoding, &params_bytes)?;
    let content_encoding = ContentEncoding::from_wire_id(r.read_i8().await?)?;
    let content = read_i32_bytes(r).await?;

    Ok(Request {
        version: crate::envelope::STREST_VERSION,
        user_agent: String::new(),
        txn_id,
        txn_accept,
        uri,
        method,
        params,
        param_encoding,
        content_encoding,
        content,
        shard,
    })
}

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = BytesMut::new();
    put_i16_string(&mut buf, &resp.txn_id);
    buf.put_i8(resp.txn_status.wire_id());
    buf.put_i16(resp.status_code as i16);
    put_i16_string(&mut buf, &resp.status_message);
    buf.put_i8(resp.param_encoding.wire_id());
    let params_bytes = encode_params(resp.param_encoding, &resp.params)?;
    put_i32_bytes(&mut buf, &params_bytes);
    buf.put_i8(resp.content_encoding.wire_id());
    put_i32_bytes(&mut buf, &resp.content);
    Ok(buf.to_vec())
}

pub async fn decode_response<R: AsyncRead + Unpin>(r: &mut R) -> Result<Response, ProtocolError> {
    let txn_id = read_i16_string(r).await?;
    let txn_status = TxnStatus::from_wire_id(r.read_i8().await?)?;
    let status_code = r.read_i16().await? as u16;
    let status_message = read_i16_string(r).await?;
    let param_encoding = ParamEncoding::from_wire_id(r.read_i8().await?)?;
    let params_bytes = read_i32_bytes(r).await?;
    let params = decode_params(param_encoding, &params_bytes)?;
    let content_encoding = ContentEncoding::from_wire_id(r.read_i8().await?)?;
    let content = read_i32_bytes(r).await?;

    Ok(Response {
        txn_id,
        txn_status,
        status_code,
        status_message,
        param_encoding,
        content_encoding,
        content,
        params,
    })
}

/// Writes an already-encoded frame to the connection. Transports are
/// expected to serialize writes per connection (a single writer task or a
/// write lock) so interleaved responses never interleave their bytes; this
/// function itself performs a single `write_all`.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &[u8]) -> Result<(), ProtocolError> {
    w.write_all(frame).await?;
    w.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn ping_request_matches_exact_byte_layout() {
        // GET /ping, txn id "x", single accept, no shard, empty JSON
        // params, empty bytes content.
        let mut req = Request::new("/ping", Method::Get);
        req.txn_id = "x".to_string();

        let encoded = encode_request(&req).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&(-1i16).to_be_bytes()); // shard partition
        expected.extend_from_slice(&(0i16).to_be_bytes()); // shard key len
        expected.extend_from_slice(&(0i64).to_be_bytes()); // shard revision
        expected.extend_from_slice(&(1i16).to_be_bytes()); // txn id len
        expected.push(b'x');
        expected.push(0); // accept = single
        expected.push(0); // method = GET
        expected.extend_from_slice(&(5i16).to_be_bytes()); // uri len
        expected.extend_from_slice(b"/ping");
        expected.push(0); // paramEncoding = json
        expected.extend_from_slice(&(2i32).to_be_bytes()); // params len
        expected.extend_from_slice(b"{}");
        expected.push(1); // contentEncoding = bytes
        expected.extend_from_slice(&(0i32).to_be_bytes()); // content len

        assert_eq!(encoded, expected);
    }

    #[tokio::test]
    async fn request_round_trips_through_decode() {
        let mut req = Request::new("/echo", Method::Post);
        req.txn_id = "42".to_string();
        req.params.put("name", "trendrr");
        req.content = b"payload".to_vec();

        let bytes = encode_request(&req).unwrap();
        let mut cursor = Cursor::new(bytes);
        let decoded = decode_request(&mut cursor).await.unwrap();

        assert_eq!(decoded.txn_id, "42");
        assert_eq!(decoded.uri, "/echo");
        assert_eq!(decoded.method, Method::Post);
        assert_eq!(decoded.params.get_str("name"), Some("trendrr"));
        assert_eq!(decoded.content, b"payload");
        assert_eq!(decoded.shard.partition, -1);
    }

    #[tokio::test]
    async fn response_round_trips_through_decode() {
        let mut resp = Response::ok("7");
        resp.params.put("answer", 42i64);

        let bytes = encode_response(&resp).unwrap();
        let mut cursor = Cursor::new(bytes);
        let decoded = decode_response(&mut cursor).await.unwrap();

        assert_eq!(decoded.txn_id, "7");
        assert_eq!(decoded.status_code, 200);
        assert_eq!(decoded.params.get_i64("answer"), Some(42));
    }

    #[tokio::test]
    async fn negative_length_prefix_is_rejected() {
        let mut cursor = Cursor::new(vec![0xFFu8, 0xFF]); // i16 = -1
        let err = read_i16_string(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::NegativeLength { .. }));
    }

    #[tokio::test]
    async fn msgpack_param_encoding_round_trips() {
        let mut req = Request::new("/echo", Method::Post);
        req.txn_id = "1".to_string();
        req.param_encoding = ParamEncoding::MsgPack;
        req.params.put("x", 1i64);

        let bytes = encode_request(&req).unwrap();
        let mut cursor = Cursor::new(bytes);
        let decoded = decode_request(&mut cursor).await.unwrap();
        assert_eq!(decoded.param_encoding, ParamEncoding::MsgPack);
        assert_eq!(decoded.params.get_i64("x"), Some(1));
    }
}
