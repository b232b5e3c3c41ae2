//! Raw request forwarding for the `/api` proxy routes.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{is_dot_segment, read_json, BackendClient, BackendError};

/// Chunks buffered between the inbound body and the outbound request.
const RELAY_BUFFER: usize = 8;

/// Headers that describe a single connection and must not be forwarded.
/// `accept-encoding` is dropped as well: relayed bodies are read as plain JSON.
const HOP_BY_HOP: &[&str] = &[
    "accept-encoding",
    "connection",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// An inbound request to be re-issued against the backend.
pub struct ForwardRequest {
    pub method: Method,
    /// Path and query relative to the backend base URL, starting with `/`.
    pub target: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl BackendClient {
    /// Re-issues `request` against `{base_url}{target}`, streaming the body
    /// through unchanged, and returns the upstream status with its JSON body.
    pub async fn forward(&self, request: ForwardRequest) -> Result<(u16, Value), BackendError> {
        let request_id = Uuid::new_v4();
        let path = request.target.split('?').next().unwrap_or_default();
        if let Some(segment) = path.split('/').find(|s| is_dot_segment(s)) {
            return Err(BackendError::Validation(format!(
                "Invalid path segment '{segment}'"
            )));
        }
        let url = format!("{}{}", self.base_url, request.target);

        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|_| BackendError::Validation(format!("Unsupported method {}", request.method)))?;

        info!(%request_id, "Forwarding {} {}", request.method, url);

        let mut builder = self
            .client
            .request(method, &url)
            .timeout(self.forward_timeout(&request.headers));

        let listed = connection_tokens(&request.headers);
        for (name, value) in request.headers.iter() {
            if is_hop_by_hop(name.as_str()) || listed.iter().any(|t| t == name.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_bytes());
        }

        if carries_body(&request.method) {
            builder = builder.body(reqwest::Body::wrap_stream(BodyRelay::spawn(request.body)));
        }

        let response = builder.send().await.map_err(|e| {
            warn!(%request_id, "Forwarding failed: {e}");
            BackendError::from(e)
        })?;

        let status = response.status().as_u16();
        let body = read_json(response).await?;
        info!(%request_id, "Upstream responded {status}");

        Ok((status, body))
    }

    /// Multipart uploads get the longer upload timeout.
    fn forward_timeout(&self, headers: &HeaderMap) -> std::time::Duration {
        let is_multipart = headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/"));
        if is_multipart {
            self.upload_timeout
        } else {
            self.publish_timeout.max(self.request_timeout)
        }
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Header names listed in `Connection`, lowercased. They are hop-by-hop too.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(axum::http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Pumps an axum body through a channel so the outbound side sees a `Sync`
/// stream. Chunks are passed along as-is.
struct BodyRelay {
    rx: mpsc::Receiver<Result<Bytes, std::io::Error>>,
}

impl BodyRelay {
    fn spawn(body: Body) -> Self {
        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        tokio::spawn(async move {
            let mut stream = body.into_data_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(std::io::Error::other);
                let failed = chunk.is_err();
                if tx.send(chunk).await.is_err() || failed {
                    break;
                }
            }
        });
        Self { rx }
    }
}

impl Stream for BodyRelay {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::super::testing::spawn_upstream;
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_hop_by_hop_headers_are_recognised() {
        assert!(is_hop_by_hop("Host"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("content-length"));
    }

    #[tokio::test]
    async fn test_forward_streams_binary_body_unchanged() {
        let router = Router::new().route(
            "/echo",
            post(|headers: HeaderMap, body: Bytes| async move {
                Json(json!({
                    "len": body.len(),
                    "bytes": body.to_vec(),
                    "content_type": headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default(),
                }))
            }),
        );
        let base = spawn_upstream(router).await;
        let client = BackendClient::new(&Config::for_backend(&base)).unwrap();

        let payload: Vec<u8> = vec![0x25, 0x50, 0x44, 0x46, 0x00, 0xff, 0xfe, 0x0d, 0x0a];
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("multipart/form-data; boundary=xyz"),
        );
        headers.insert("host", HeaderValue::from_static("portlink.local"));

        let (status, body) = client
            .forward(ForwardRequest {
                method: Method::POST,
                target: "/echo".into(),
                headers,
                body: Body::from(payload.clone()),
            })
            .await
            .unwrap();

        assert_eq!(status, 200);
        assert_eq!(body["len"], payload.len());
        assert_eq!(body["bytes"], json!(payload));
        assert_eq!(body["content_type"], "multipart/form-data; boundary=xyz");
    }

    #[test]
    fn test_connection_tokens() {
        let mut headers = HeaderMap::new();
        headers.append("connection", HeaderValue::from_static("keep-alive, X-Session-Hint"));
        headers.append("connection", HeaderValue::from_static(" x-trace ,"));
        assert_eq!(
            connection_tokens(&headers),
            vec!["keep-alive", "x-session-hint", "x-trace"]
        );
    }

    #[tokio::test]
    async fn test_forward_drops_headers_named_in_connection() {
        let router = Router::new().route(
            "/echo",
            get(|headers: HeaderMap| async move {
                Json(json!({
                    "session_hint": headers.get("x-session-hint").is_some(),
                    "keep": headers.get("x-keep").and_then(|v| v.to_str().ok()),
                }))
            }),
        );
        let base = spawn_upstream(router).await;
        let client = BackendClient::new(&Config::for_backend(&base)).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("X-Session-Hint"));
        headers.insert("x-session-hint", HeaderValue::from_static("abc"));
        headers.insert("x-keep", HeaderValue::from_static("1"));

        let (_, body) = client
            .forward(ForwardRequest {
                method: Method::GET,
                target: "/echo".into(),
                headers,
                body: Body::empty(),
            })
            .await
            .unwrap();

        assert_eq!(body["session_hint"], false);
        assert_eq!(body["keep"], "1");
    }

    #[tokio::test]
    async fn test_forward_refuses_dot_segments() {
        let client = BackendClient::new(&Config::for_backend("http://127.0.0.1:9/api")).unwrap();
        for target in ["/../secret", "/resume/%2e%2E", "/./x?y=1"] {
            let err = client
                .forward(ForwardRequest {
                    method: Method::GET,
                    target: target.into(),
                    headers: HeaderMap::new(),
                    body: Body::empty(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, BackendError::Validation(_)), "{target}");
        }
    }

    #[tokio::test]
    async fn test_forward_keeps_query_string() {
        let router = Router::new().route(
            "/search",
            get(|axum::extract::RawQuery(q): axum::extract::RawQuery| async move {
                Json(json!({ "query": q }))
            }),
        );
        let base = spawn_upstream(router).await;
        let client = BackendClient::new(&Config::for_backend(&base)).unwrap();

        let (_, body) = client
            .forward(ForwardRequest {
                method: Method::GET,
                target: "/search?user=alok&page=2".into(),
                headers: HeaderMap::new(),
                body: Body::empty(),
            })
            .await
            .unwrap();

        assert_eq!(body["query"], "user=alok&page=2");
    }

    #[tokio::test]
    async fn test_forward_maps_upstream_failure() {
        let router = Router::new().route(
            "/upload",
            post(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"error": "Invalid file type"})),
                )
            }),
        );
        let base = spawn_upstream(router).await;
        let client = BackendClient::new(&Config::for_backend(&base)).unwrap();

        let err = client
            .forward(ForwardRequest {
                method: Method::POST,
                target: "/upload".into(),
                headers: HeaderMap::new(),
                body: Body::from("x"),
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Invalid file type");
    }
}
