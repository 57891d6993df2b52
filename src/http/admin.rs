//! Federation admin API: CRUD over the persistent upstream list.
//!
//! Mutations persist through the remote manager and then trigger a
//! registry sync. Responses use the `{"status":…}` envelope; errors
//! carry a code, message and trace identifier.
//!
//! The path surface below `/v1/mcp/servers/` is prefix-matched: a bare
//! `<name>` addresses one server, a trailing `/refresh` is the refresh
//! action, and any other suffix is rejected as an invalid path.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::Response as AxumResponse;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::http::AppState;
use crate::mcp::protocol::new_trace_id;
use crate::remote::config::ServerConfig;

#[derive(Serialize)]
struct ApiErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    trace_id: String,
}

#[derive(Serialize)]
struct ApiEnvelope {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiErrorBody>,
}

fn ok_json(data: Value) -> AxumResponse {
    envelope(
        StatusCode::OK,
        &ApiEnvelope {
            status: "ok",
            data: Some(data),
            error: None,
        },
    )
}

fn fail_json(status: StatusCode, code: &str, message: &str) -> AxumResponse {
    envelope(
        status,
        &ApiEnvelope {
            status: "error",
            data: None,
            error: Some(ApiErrorBody {
                code: code.to_string(),
                message: message.to_string(),
                trace_id: new_trace_id(),
            }),
        },
    )
}

fn envelope(status: StatusCode, payload: &ApiEnvelope) -> AxumResponse {
    let body = serde_json::to_vec(payload).unwrap_or_default();
    axum::http::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_default()
}

/// `GET /v1/mcp/servers`.
pub async fn list_servers(State(state): State<Arc<AppState>>) -> AxumResponse {
    ok_json(json!({ "servers": state.manager.list() }))
}

/// `POST /v1/mcp/servers` — upsert and sync.
pub async fn upsert_server(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ServerConfig>, JsonRejection>,
) -> AxumResponse {
    let Ok(Json(config)) = body else {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", "invalid request body");
    };
    let name = config.name.trim().to_string();
    if let Err(err) = state.manager.upsert(config) {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", &err.to_string());
    }
    state.manager.sync_registry(state.server.registry()).await;
    ok_json(json!({ "name": name }))
}

/// `GET /v1/mcp/servers/<name>`.
pub async fn get_server(
    State(state): State<Arc<AppState>>,
    Path(rest): Path<String>,
) -> AxumResponse {
    if rest.is_empty() {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", "name is required");
    }
    if rest.contains('/') {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", "invalid path");
    }
    match state.manager.get(&rest) {
        Some(server) => match serde_json::to_value(server) {
            Ok(value) => ok_json(value),
            Err(err) => {
                warn!(error = %err, "failed to serialise server config");
                fail_json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error",
                )
            }
        },
        None => fail_json(StatusCode::NOT_FOUND, "not_found", "server not found"),
    }
}

/// `PUT /v1/mcp/servers/<name>` — upsert under the path name and sync.
pub async fn put_server(
    State(state): State<Arc<AppState>>,
    Path(rest): Path<String>,
    body: Result<Json<ServerConfig>, JsonRejection>,
) -> AxumResponse {
    if rest.is_empty() || rest.contains('/') {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", "name is required");
    }
    let Ok(Json(mut config)) = body else {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", "invalid request body");
    };
    config.name = rest.clone();
    if let Err(err) = state.manager.upsert(config) {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", &err.to_string());
    }
    state.manager.sync_registry(state.server.registry()).await;
    ok_json(json!({ "name": rest }))
}

/// `DELETE /v1/mcp/servers/<name>` — delete and sync.
pub async fn delete_server(
    State(state): State<Arc<AppState>>,
    Path(rest): Path<String>,
) -> AxumResponse {
    if rest.is_empty() || rest.contains('/') {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", "name is required");
    }
    if let Err(err) = state.manager.delete(&rest) {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", &err.to_string());
    }
    state.manager.sync_registry(state.server.registry()).await;
    ok_json(json!({ "name": rest }))
}

/// `POST /v1/mcp/servers/<name>/refresh` — sync now.
///
/// The trailing `/refresh` is stripped before validation; any other
/// remaining slash is an invalid path.
pub async fn refresh_server(
    State(state): State<Arc<AppState>>,
    Path(rest): Path<String>,
) -> AxumResponse {
    let name = rest.strip_suffix("/refresh").unwrap_or(&rest).to_string();
    if name.contains('/') {
        return fail_json(StatusCode::BAD_REQUEST, "bad_request", "invalid path");
    }
    state.manager.sync_registry(state.server.registry()).await;
    let mut payload = json!({ "refreshed": true });
    if !name.is_empty() {
        payload["name"] = Value::String(name);
    }
    ok_json(payload)
}
