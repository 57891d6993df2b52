//! Single-shot HTTP and SSE MCP transports.
//!
//! `POST /mcp` takes one envelope per request and replies as JSON or as
//! a single SSE frame depending on the `Accept` header. `GET /mcp/sse`
//! carries the envelope URL-encoded in the `request` query parameter
//! and always replies as one frame. Notifications get `202 Accepted`
//! with an empty body on both routes.
//!
//! Transport-level failures (unreadable body, missing query payload)
//! are invalid-request responses, never bare HTTP error statuses. The
//! sticky auth-config error and bearer validation run before the body
//! is even parsed.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Query, State};
use axum::http::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response as AxumResponse;
use bytes::Bytes;
use serde::Deserialize;

use crate::http::AppState;
use crate::mcp::protocol::{ErrorDetail, ErrorKind, Response};

/// Query parameters of the SSE transport.
#[derive(Debug, Deserialize)]
pub struct SseQuery {
    /// URL-encoded request envelope.
    #[serde(default)]
    request: Option<String>,
}

/// `POST /mcp`.
pub async fn mcp_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> AxumResponse {
    if let Some(response) = state.server.transport_guard(authorization(&headers)) {
        return negotiated(&headers, &response);
    }

    let Ok(payload) = body else {
        let response = Response::failure(
            None,
            ErrorKind::InvalidRequest,
            ErrorDetail::invalid_request("unable to read request"),
        );
        return negotiated(&headers, &response);
    };

    let (response, notification) = state.server.handle_payload(&payload).await;
    if notification {
        return accepted();
    }
    negotiated(&headers, &response)
}

/// `GET /mcp/sse?request=<url-encoded-envelope>`.
pub async fn mcp_sse(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SseQuery>,
) -> AxumResponse {
    if let Some(response) = state.server.transport_guard(authorization(&headers)) {
        return sse_frame(&response);
    }

    let Some(payload) = query.request.filter(|raw| !raw.is_empty()) else {
        let response = Response::failure(
            None,
            ErrorKind::InvalidRequest,
            ErrorDetail::invalid_request("missing request"),
        );
        return sse_frame(&response);
    };

    let (response, notification) = state.server.handle_payload(payload.as_bytes()).await;
    if notification {
        return accepted();
    }
    sse_frame(&response)
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("text/event-stream"))
        .unwrap_or(false)
}

/// Picks the reply framing from the `Accept` header.
fn negotiated(headers: &HeaderMap, response: &Response) -> AxumResponse {
    if accepts_event_stream(headers) {
        sse_frame(response)
    } else {
        json_body(response)
    }
}

/// `202 Accepted`, empty body.
fn accepted() -> AxumResponse {
    axum::http::Response::builder()
        .status(StatusCode::ACCEPTED)
        .body(Body::empty())
        .unwrap_or_default()
}

fn json_body(response: &Response) -> AxumResponse {
    let payload = serde_json::to_vec(response).unwrap_or_default();
    axum::http::Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .unwrap_or_default()
}

/// One `event: message` / `data:` frame, flushed as the whole body.
fn sse_frame(response: &Response) -> AxumResponse {
    let payload = serde_json::to_string(response).unwrap_or_default();
    let frame = format!("event: message\ndata: {payload}\n\n");
    axum::http::Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header(CONNECTION, "keep-alive")
        .body(Body::from(frame))
        .unwrap_or_default()
}
