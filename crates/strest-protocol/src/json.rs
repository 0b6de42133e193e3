//! Line-delimited JSON codec: one `Request`/`Response` envelope per line,
//! used by the JSON-socket transport (`strest-server`) and by
//! `tokio_util::codec::LinesCodec` on both ends of the wire.

use crate::envelope::{Request, Response};
use crate::error::ProtocolError;

pub fn encode_request(req: &Request) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(&req.to_json()?)?)
}

pub fn decode_request(bytes: &[u8]) -> Result<Request, ProtocolError> {
    let value = serde_json::from_slice(bytes)?;
    Request::from_json(value)
}

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(&resp.to_json()?)?)
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, ProtocolError> {
    let value = serde_json::from_slice(bytes)?;
    Response::from_json(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Method;

    #[test]
    fn encode_then_decode_request_preserves_uri_and_method() {
        let mut req = Request::new("/ping", Method::Get);
        req.txn_id = "1".to_string();
        let bytes = encode_request(&req).unwrap();
        let back = decode_request(&bytes).unwrap();
        assert_eq!(back.uri, "/ping");
        assert_eq!(back.method, Method::Get);
        assert_eq!(back.txn_id, "1");
    }
}
