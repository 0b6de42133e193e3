//! The HTTP transport: a thin `axum` adapter translating `Request`/
//! `Response` to/from ordinary HTTP, the external interface left
//! unspecified beyond "one that maps to/from the wire model". Only
//! single-shot (`single`-accept) semantics are meaningful over plain HTTP;
//! a handler that tries to stream `continue` responses here will see only
//! its final `completed` response reach the caller.
//!
//! Follows the original's `ToStrestRequest`: the `Strest-Txn-Id` and
//! `Strest-Txn-Accept` headers seed the transaction (accept defaults to
//! `single` if absent or unrecognized), the query string is decoded into
//! params the same way a form body is, and a JSON body is merged in on top
//! of both.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method as HttpMethod, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Router as AxumRouter;
use strest_protocol::{Method, Request, Response, TxnAccept};
use strest_types::DynMap;
use tokio::sync::broadcast;

use crate::dispatch::dispatch;
use crate::error::ServerError;
use crate::router::Router;

const TXN_ID_HEADER: &str = "strest-txn-id";
const TXN_ACCEPT_HEADER: &str = "strest-txn-accept";

pub fn app(router: Arc<Router>) -> AxumRouter {
    AxumRouter::new().fallback(handle).with_state(router)
}

async fn handle(
    State(router): State<Arc<Router>>,
    method: HttpMethod,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> AxumResponse {
    let Some(strest_method) = to_strest_method(&method) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };

    let req = to_strest_request(strest_method, &uri, &headers, &body);
    let txn_id = req.txn_id.clone();

    let mut rx = dispatch(router, req);
    let resp = rx.recv().await.unwrap_or_else(|| {
        let mut r = Response::new(txn_id, 500);
        r.status_message = "handler produced no response".to_string();
        r
    });

    to_axum_response(resp)
}

/// Builds a `Request` from the pieces of an inbound HTTP request: the
/// `Strest-Txn-Id`/`Strest-Txn-Accept` headers seed the transaction, the
/// query string and (for a form body) the request body both decode into
/// params via the same bracket-notation rules, and a JSON body is merged on
/// top of either.
fn to_strest_request(method: Method, uri: &axum::http::Uri, headers: &HeaderMap, body: &[u8]) -> Request {
    let mut req = Request::new(uri.path().to_string(), method);
    req.txn_id = header_str(headers, TXN_ID_HEADER)
        .map(str::to_string)
        .unwrap_or_else(strest_protocol::new_txn_id);
    req.txn_accept = header_str(headers, TXN_ACCEPT_HEADER)
        .and_then(|v| TxnAccept::from_str(v).ok())
        .unwrap_or(TxnAccept::Single);

    if let Some(query) = uri.query() {
        req.params.put_all(&DynMap::url_decode(query));
    }

    if !body.is_empty() {
        let content_type = header_str(headers, "content-type").unwrap_or("");
        if content_type.starts_with("application/x-www-form-urlencoded") {
            let form = String::from_utf8_lossy(body);
            req.params.put_all(&DynMap::url_decode(&form));
        } else if let Ok(params) = serde_json::from_slice::<DynMap>(body) {
            req.params.put_all(&params);
        }
    }
    req
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn to_strest_method(method: &HttpMethod) -> Option<Method> {
    match method.as_str() {
        "GET" => Some(Method::Get),
        "POST" => Some(Method::Post),
        "PUT" => Some(Method::Put),
        "DELETE" => Some(Method::Delete),
        _ => None,
    }
}

fn to_axum_response(resp: Response) -> AxumResponse {
    let status = StatusCode::from_u16(resp.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let json = resp.to_json().unwrap_or_else(|_| serde_json::json!({}));
    (status, axum::Json(json)).into_response()
}

pub async fn serve(
    bind_addr: &str,
    router: Arc<Router>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "http transport listening");
    axum::serve(listener, app(router))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            tracing::info!("http transport shutting down");
        })
        .await
        .map_err(|e| ServerError::Io(std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Uri};

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn honors_txn_id_and_accept_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(TXN_ID_HEADER, HeaderValue::from_static("client-supplied-id"));
        headers.insert(TXN_ACCEPT_HEADER, HeaderValue::from_static("multi"));

        let req = to_strest_request(Method::Get, &uri("/ping"), &headers, b"");
        assert_eq!(req.txn_id, "client-supplied-id");
        assert_eq!(req.txn_accept, TxnAccept::Multi);
    }

    #[test]
    fn allocates_a_txn_id_and_defaults_accept_when_headers_are_absent() {
        let req = to_strest_request(Method::Get, &uri("/ping"), &HeaderMap::new(), b"");
        assert!(!req.txn_id.is_empty());
        assert_eq!(req.txn_accept, TxnAccept::Single);
    }

    #[test]
    fn unrecognized_accept_header_falls_back_to_single() {
        let mut headers = HeaderMap::new();
        headers.insert(TXN_ACCEPT_HEADER, HeaderValue::from_static("bogus"));
        let req = to_strest_request(Method::Get, &uri("/ping"), &headers, b"");
        assert_eq!(req.txn_accept, TxnAccept::Single);
    }

    #[test]
    fn get_query_string_populates_params() {
        let req = to_strest_request(Method::Get, &uri("/search?q=rust&page=2"), &HeaderMap::new(), b"");
        assert_eq!(req.params.get_str("q"), Some("rust"));
        assert_eq!(req.params.get_i64("page"), Some(2));
    }

    #[test]
    fn post_form_body_populates_params() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/x-www-form-urlencoded"));
        let req = to_strest_request(Method::Post, &uri("/users"), &headers, b"name=ada&age=36");
        assert_eq!(req.params.get_str("name"), Some("ada"));
        assert_eq!(req.params.get_i64("age"), Some(36));
    }

    #[test]
    fn post_json_body_populates_params() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let req = to_strest_request(Method::Post, &uri("/users"), &headers, br#"{"name":"ada"}"#);
        assert_eq!(req.params.get_str("name"), Some("ada"));
    }

    #[test]
    fn query_string_and_json_body_both_contribute_params() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let req = to_strest_request(Method::Put, &uri("/users/1?source=import"), &headers, br#"{"name":"ada"}"#);
        assert_eq!(req.params.get_str("source"), Some("import"));
        assert_eq!(req.params.get_str("name"), Some("ada"));
    }
}
