use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    Json,
};
use serde_json::Value;
use tracing::error;

use crate::backend::forward::ForwardRequest;
use crate::backend::is_dot_segment;
use crate::errors::AppError;
use crate::render::encode_segment;
use crate::state::AppState;

const UPLOAD_FALLBACK: &str = "Failed to upload file";
const RESUME_FALLBACK: &str = "Failed to fetch resume";
const CREATE_PROJECT_FALLBACK: &str = "Failed to create Vercel project";
const PROXY_FALLBACK: &str = "Proxy request failed";

type ProxyResponse = Result<(StatusCode, Json<Value>), AppError>;

/// Forwards one request and relays the JSON answer.
/// Every failure becomes a 500 with an `error` message.
async fn relay(state: &AppState, request: ForwardRequest, fallback: &str) -> ProxyResponse {
    let target = request.target.clone();
    match state.backend.forward(request).await {
        Ok((status, body)) => Ok((
            StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
            Json(body),
        )),
        Err(e) => {
            error!("Proxying {target} failed: {e}");
            Err(AppError::from_backend(&e, fallback))
        }
    }
}

/// POST /api/upload
pub async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> ProxyResponse {
    let request = ForwardRequest {
        method: Method::POST,
        target: "/upload".to_string(),
        headers,
        body,
    };
    relay(&state, request, UPLOAD_FALLBACK).await
}

/// GET /api/resume/:username
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ProxyResponse {
    let request = ForwardRequest {
        method: Method::GET,
        target: format!("/resume/{}", checked_segment(&username)?),
        headers,
        body: Body::empty(),
    };
    relay(&state, request, RESUME_FALLBACK).await
}

/// POST /api/create-vercel-project
pub async fn handle_create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> ProxyResponse {
    let request = ForwardRequest {
        method: Method::POST,
        target: "/create-vercel-project".to_string(),
        headers,
        body,
    };
    relay(&state, request, CREATE_PROJECT_FALLBACK).await
}

/// GET|POST /api/proxy/*path
/// Strips the `/api/proxy` prefix and forwards the rest, query included.
pub async fn handle_proxy(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Body,
) -> ProxyResponse {
    let request = ForwardRequest {
        method,
        target: rewrite_target(&path, query.as_deref())?,
        headers,
        body,
    };
    relay(&state, request, PROXY_FALLBACK).await
}

/// Encodes one decoded path segment, refusing `.` and `..`.
fn checked_segment(segment: &str) -> Result<String, AppError> {
    if is_dot_segment(segment) {
        return Err(AppError::Validation(format!(
            "Invalid path segment '{segment}'"
        )));
    }
    Ok(encode_segment(segment))
}

fn rewrite_target(path: &str, query: Option<&str>) -> Result<String, AppError> {
    let path = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(checked_segment)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("/{}?{q}", path.join("/")),
        None => format!("/{}", path.join("/")),
    })
}
