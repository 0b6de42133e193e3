//! `Request`/`Response` and their JSON envelope shapes.
//!
//! The JSON shapes are hand-written rather than derived, mirroring the
//! original's hand-written `MarshalJSON`/`UnmarshalJSON` (`cheshire/strestpackets.go`):
//! this crate needs full control over where `params` lives (nested under
//! `strest.params` on the request, spliced at the top level on the
//! response) which `#[derive(Serialize)]` cannot express directly.

use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::{json, Map, Value as Json};
use strest_types::DynMap;

use crate::error::ProtocolError;
use crate::wire::{ContentEncoding, Method, ParamEncoding, TxnAccept, TxnStatus};

/// Protocol version carried in every envelope. Matches the original's
/// `StrestVersion = float32(2)`.
pub const STREST_VERSION: f64 = 2.0;

static TXN_COUNTER: AtomicI64 = AtomicI64::new(1);

/// Allocates a fresh, process-unique transaction id, matching the
/// original's atomically incrementing `NewTxnId`.
pub fn new_txn_id() -> String {
    TXN_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// The sharding header carried on every request. A request with no shard
/// routing information uses the sentinel `partition == -1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardRequest {
    pub partition: i32,
    pub key: String,
    pub revision: i64,
}

impl Default for ShardRequest {
    fn default() -> Self {
        ShardRequest {
            partition: -1,
            key: String::new(),
            revision: 0,
        }
    }
}

impl ShardRequest {
    pub fn is_present(&self) -> bool {
        self.partition >= 0 || !self.key.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub version: f64,
    pub user_agent: String,
    pub txn_id: String,
    pub txn_accept: TxnAccept,
    pub uri: String,
    pub method: Method,
    pub params: DynMap,
    pub param_encoding: ParamEncoding,
    pub content_encoding: ContentEncoding,
    pub content: Vec<u8>,
    pub shard: ShardRequest,
}

impl Request {
    /// Builds a request with the original's defaults: version 2, a fresh
    /// txn id, `single` accept, no shard routing.
    pub fn new(uri: impl Into<String>, method: Method) -> Self {
        Request {
            version: STREST_VERSION,
            user_agent: "strest-rust".to_string(),
            txn_id: new_txn_id(),
            txn_accept: TxnAccept::Single,
            uri: uri.into(),
            method,
            params: DynMap::new(),
            param_encoding: ParamEncoding::Json,
            content_encoding: ContentEncoding::Bytes,
            content: Vec::new(),
            shard: ShardRequest::default(),
        }
    }

    pub fn to_json(&self) -> Result<Json, ProtocolError> {
        let mut strest = Map::new();
        strest.insert("v".into(), json!(self.version));
        strest.insert("user-agent".into(), json!(self.user_agent));
        strest.insert(
            "txn".into(),
            json!({ "id": self.txn_id, "accept": self.txn_accept.as_str() }),
        );
        strest.insert("uri".into(), json!(self.uri));
        strest.insert("method".into(), json!(self.method.as_str()));
        strest.insert("params".into(), serde_json::to_value(&self.params)?);
        if self.shard.is_present() {
            strest.insert(
                "shard".into(),
                json!({
                    "partition": self.shard.partition,
                    "key": self.shard.key,
                    "revision": self.shard.revision,
                }),
            );
        }
        Ok(json!({ "strest": Json::Object(strest) }))
    }

    pub fn from_json(value: Json) -> Result<Self, ProtocolError> {
        let strest = value
            .get("strest")
            .ok_or(ProtocolError::InvalidEnvelope { field: "strest" })?;

        let version = strest.get("v").and_then(Json::as_f64).unwrap_or(STREST_VERSION);
        let user_agent = strest
            .get("user-agent")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();
        let txn = strest.get("txn");
        let txn_id = txn
            .and_then(|t| t.get("id"))
            .and_then(Json::as_str)
            .ok_or(ProtocolError::InvalidEnvelope { field: "strest.txn.id" })?
            .to_string();
        let txn_accept = txn
            .and_then(|t| t.get("accept"))
            .and_then(Json::as_str)
            .map(TxnAccept::from_str)
            .transpose()?
            .unwrap_or(TxnAccept::Single);
        let uri = strest
            .get("uri")
            .and_then(Json::as_str)
            .ok_or(ProtocolError::InvalidEnvelope { field: "strest.uri" })?
            .to_string();
        let method = strest
            .get("method")
            .and_then(Json::as_str)
            .map(Method::from_str)
            .transpose()?
            .ok_or(ProtocolError::InvalidEnvelope { field: "strest.method" })?;

        let mut params: DynMap = match strest.get("params") {
            Some(p) => serde_json::from_value(p.clone())?,
            None => DynMap::new(),
        };

        // Fall back to the legacy `_p`/`_k`/`_v` shard params if no
        // dedicated `strest.shard` object is present.
        let shard = if let Some(s) = strest.get("shard") {
            ShardRequest {
                partition: s.get("partition").and_then(Json::as_i64).unwrap_or(-1) as i32,
                key: s
                    .get("key")
                    .and_then(Json::as_str)
                    .unwrap_or_default()
                    .to_string(),
                revision: s.get("revision").and_then(Json::as_i64).unwrap_or(0),
            }
        } else {
            let partition = params.get_i64("_p").map(|v| v as i32);
            let key = params.get_str("_k").map(|s| s.to_string());
            let revision = params.get_i64("_v");
            if partition.is_some() || key.is_some() {
                let shard = ShardRequest {
                    partition: partition.unwrap_or(-1),
                    key: key.unwrap_or_default(),
                    revision: revision.unwrap_or(0),
                };
                params = strip_shard_params(params);
                shard
            } else {
                ShardRequest::default()
            }
        };

        Ok(Request {
            version,
            user_agent,
            txn_id,
            txn_accept,
            uri,
            method,
            params,
            param_encoding: ParamEncoding::Json,
            content_encoding: ContentEncoding::Bytes,
            content: Vec::new(),
            shard,
        })
    }
}

fn strip_shard_params(params: DynMap) -> DynMap {
    // Legacy shard params are only present on the fallback path; DynMap has
    // no remove(), so rebuild excluding the reserved keys.
    let mut clean = DynMap::new();
    for (k, v) in params.iter() {
        if !matches!(k.as_str(), "_p" | "_k" | "_v" | "_qt") {
            clean.put(k.clone(), v.clone());
        }
    }
    clean
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub txn_id: String,
    pub txn_status: TxnStatus,
    pub status_code: u16,
    pub status_message: String,
    pub param_encoding: ParamEncoding,
    pub content_encoding: ContentEncoding,
    pub content: Vec<u8>,
    /// Arbitrary top-level response data. The original embeds a `DynMap`
    /// directly in the `Response` struct and splices its keys at the JSON
    /// top level, alongside `status`/`strest`.
    pub params: DynMap,
}

impl Response {
    pub fn new(txn_id: impl Into<String>, status_code: u16) -> Self {
        Response {
            txn_id: txn_id.into(),
            txn_status: TxnStatus::Completed,
            status_code,
            status_message: String::new(),
            param_encoding: ParamEncoding::Json,
            content_encoding: ContentEncoding::Bytes,
            content: Vec::new(),
            params: DynMap::new(),
        }
    }

    pub fn ok(txn_id: impl Into<String>) -> Self {
        let mut r = Response::new(txn_id, 200);
        r.status_message = "ok".to_string();
        r
    }

    pub fn to_json(&self) -> Result<Json, ProtocolError> {
        let mut top = match serde_json::to_value(&self.params)? {
            Json::Object(m) => m,
            _ => Map::new(),
        };
        top.insert(
            "status".into(),
            json!({ "code": self.status_code, "message": self.status_message }),
        );
        top.insert(
            "strest".into(),
            json!({
                "v": STREST_VERSION,
                "txn": { "id": self.txn_id, "status": self.txn_status.as_str() },
            }),
        );
        Ok(Json::Object(top))
    }

    pub fn from_json(value: Json) -> Result<Self, ProtocolError> {
        let status = value.get("status");
        let status_code = status
            .and_then(|s| s.get("code"))
            .and_then(Json::as_u64)
            .ok_or(ProtocolError::InvalidEnvelope { field: "status.code" })? as u16;
        let status_message = status
            .and_then(|s| s.get("message"))
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();

        let strest = value
            .get("strest")
            .ok_or(ProtocolError::InvalidEnvelope { field: "strest" })?;
        let txn = strest.get("txn");
        let txn_id = txn
            .and_then(|t| t.get("id"))
            .and_then(Json::as_str)
            .ok_or(ProtocolError::InvalidEnvelope { field: "strest.txn.id" })?
            .to_string();
        let txn_status = txn
            .and_then(|t| t.get("status"))
            .and_then(Json::as_str)
            .map(TxnStatus::from_str)
            .transpose()?
            .unwrap_or(TxnStatus::Completed);

        let mut top = match value {
            Json::Object(m) => m,
            _ => Map::new(),
        };
        top.remove("status");
        top.remove("strest");
        let params: DynMap = serde_json::from_value(Json::Object(top))?;

        Ok(Response {
            txn_id,
            txn_status,
            status_code,
            status_message,
            param_encoding: ParamEncoding::Json,
            content_encoding: ContentEncoding::Bytes,
            content: Vec::new(),
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_json_round_trip() {
        let mut req = Request::new("/ping", Method::Get);
        req.txn_id = "x".to_string();
        req.params.put("hello", "world");
        let json = req.to_json().unwrap();
        assert_eq!(json["strest"]["uri"], "/ping");
        assert_eq!(json["strest"]["method"], "GET");
        assert_eq!(json["strest"]["txn"]["id"], "x");

        let back = Request::from_json(json).unwrap();
        assert_eq!(back.uri, "/ping");
        assert_eq!(back.method, Method::Get);
        assert_eq!(back.params.get_str("hello"), Some("world"));
    }

    #[test]
    fn response_params_are_spliced_at_top_level() {
        let mut resp = Response::ok("x");
        resp.params.put("value", 42i64);
        let json = resp.to_json().unwrap();
        assert_eq!(json["status"]["code"], 200);
        assert_eq!(json["value"], 42);
        assert!(json.get("params").is_none());

        let back = Response::from_json(json).unwrap();
        assert_eq!(back.status_code, 200);
        assert_eq!(back.params.get_i64("value"), Some(42));
    }

    #[test]
    fn legacy_shard_params_are_recognized_and_stripped() {
        let mut value = serde_json::json!({
            "strest": {
                "v": 2.0,
                "txn": {"id": "1", "accept": "single"},
                "uri": "/get",
                "method": "GET",
                "params": {"_p": 4, "_k": "abc", "other": 1}
            }
        });
        let req = Request::from_json(value.take()).unwrap();
        assert_eq!(req.shard.partition, 4);
        assert_eq!(req.shard.key, "abc");
        assert!(req.params.exists("other"));
        assert!(!req.params.exists("_p"));
    }
}
