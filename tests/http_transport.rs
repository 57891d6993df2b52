//! Integration tests for the HTTP and SSE transports and the
//! federation admin API, driven in-process through the axum router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request as HttpRequest, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use open_sandbox::http::{router, AppState};
use open_sandbox::mcp::auth::{AuthConfig, Authenticator};
use open_sandbox::mcp::protocol::Response;
use open_sandbox::mcp::registry::{handler, PermissionMeta, Registry, Tool, ToolSchema};
use open_sandbox::mcp::server::McpServer;
use open_sandbox::remote::manager::RemoteManager;

fn echo_tool() -> Tool {
    Tool {
        name: "echo".to_string(),
        version: "v1".to_string(),
        permissions: PermissionMeta::allowed("workspace"),
        schema: ToolSchema::default(),
        handler: Some(handler(|params| async move {
            match params {
                Some(raw) => serde_json::from_str::<Value>(raw.get())
                    .map_err(|_| open_sandbox::mcp::protocol::ErrorDetail::invalid_params(
                        "invalid params",
                    )),
                None => Ok(Value::Null),
            }
        })),
    }
}

struct Harness {
    state: Arc<AppState>,
    _dir: tempfile::TempDir,
}

fn harness(auth: Option<Authenticator>, auth_error: Option<String>) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = Arc::new(Registry::new());
    registry.register(echo_tool());
    let manager = Arc::new(
        RemoteManager::new(dir.path().join("mcp-servers.json")).expect("manager"),
    );
    Harness {
        state: Arc::new(AppState {
            server: McpServer::new(registry, auth, auth_error),
            manager,
        }),
        _dir: dir,
    }
}

async fn send(harness: &Harness, request: HttpRequest<Body>) -> (StatusCode, Vec<u8>, String) {
    let response = router(Arc::clone(&harness.state))
        .oneshot(request)
        .await
        .expect("router response");
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec();
    (status, body, content_type)
}

fn post_mcp(payload: &str) -> HttpRequest<Body> {
    HttpRequest::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

// =============================================================================
// POST /mcp
// =============================================================================

#[tokio::test]
async fn post_mcp_replies_with_json() {
    let harness = harness(None, None);
    let (status, body, content_type) = send(
        &harness,
        post_mcp(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"1.0"}}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/json");
    let response: Response = serde_json::from_slice(&body).expect("response");
    let result = response.result.expect("result");
    assert_eq!(result["protocolVersion"], "1.0");
    assert_eq!(result["serverInfo"]["name"], "open-sandbox");
}

#[tokio::test]
async fn post_mcp_notification_is_202_with_empty_body() {
    let harness = harness(None, None);
    let (status, body, _) = send(
        &harness,
        post_mcp(r#"{"jsonrpc":"2.0","id":null,"method":"echo","params":{}}"#),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn post_mcp_honours_event_stream_accept() {
    let harness = harness(None, None);
    let request = HttpRequest::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "text/event-stream")
        .body(Body::from(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#.to_string(),
        ))
        .expect("request");
    let (status, body, content_type) = send(&harness, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/event-stream");
    let text = String::from_utf8(body).expect("utf8");
    assert!(text.starts_with("event: message\ndata: "));
    assert!(text.ends_with("\n\n"));

    let payload = text
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("data line");
    let response: Response = serde_json::from_str(payload).expect("response");
    assert!(response.result.is_some());
}

#[tokio::test]
async fn post_mcp_malformed_body_is_invalid_request() {
    let harness = harness(None, None);
    let (status, body, _) = send(&harness, post_mcp("this is not json")).await;

    assert_eq!(status, StatusCode::OK);
    let response: Response = serde_json::from_slice(&body).expect("response");
    let error = response.error.clone().expect("error");
    assert_eq!(error.code, -32600);
    assert!(serde_json::to_string(&response)
        .expect("serialise")
        .contains("\"id\":null"));
}

// =============================================================================
// Authentication
// =============================================================================

fn secret_authenticator() -> Authenticator {
    Authenticator::new(AuthConfig {
        enabled: true,
        jwt_secret: "secret".to_string(),
        ..AuthConfig::default()
    })
    .expect("authenticator")
}

#[tokio::test]
async fn post_mcp_without_bearer_is_unauthorized() {
    let harness = harness(Some(secret_authenticator()), None);
    let (status, body, _) = send(
        &harness,
        post_mcp(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response: Response = serde_json::from_slice(&body).expect("response");
    let error = response.error.expect("error");
    assert_eq!(error.code, -32001);
    let detail = error.data.expect("detail");
    assert_eq!(detail.kind, "unauthorized");
    assert_eq!(detail.message, "missing bearer token");
}

#[tokio::test]
async fn post_mcp_with_valid_bearer_succeeds() {
    use jsonwebtoken::{encode, EncodingKey, Header};
    let token = encode(
        &Header::default(),
        &json!({"sub": "tester", "exp": 4_102_444_800_u64}),
        &EncodingKey::from_secret(b"secret"),
    )
    .expect("token");

    let harness = harness(Some(secret_authenticator()), None);
    let request = HttpRequest::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#.to_string(),
        ))
        .expect("request");
    let (status, body, _) = send(&harness, request).await;

    assert_eq!(status, StatusCode::OK);
    let response: Response = serde_json::from_slice(&body).expect("response");
    assert!(response.error.is_none());
}

#[tokio::test]
async fn sticky_config_error_yields_internal_for_every_request() {
    let harness = harness(None, Some("jwt secret or public key required".to_string()));
    let (_, body, _) = send(
        &harness,
        post_mcp(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#),
    )
    .await;

    let response: Response = serde_json::from_slice(&body).expect("response");
    let error = response.error.expect("error");
    assert_eq!(error.code, -32603);
    assert_eq!(error.data.expect("detail").kind, "internal");
}

// =============================================================================
// GET /mcp/sse
// =============================================================================

#[tokio::test]
async fn sse_get_replies_with_single_frame() {
    let harness = harness(None, None);
    let envelope = r#"{"jsonrpc":"2.0","id":9,"method":"tools/list"}"#;
    let encoded: String = url_encode(envelope);
    let request = HttpRequest::builder()
        .method("GET")
        .uri(format!("/mcp/sse?request={encoded}"))
        .body(Body::empty())
        .expect("request");
    let (status, body, content_type) = send(&harness, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/event-stream");
    let text = String::from_utf8(body).expect("utf8");
    let payload = text
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .expect("data line");
    let response: Response = serde_json::from_str(payload).expect("response");
    assert!(response.result.expect("result")["tools"].is_array());
}

#[tokio::test]
async fn sse_get_without_request_is_invalid_request_frame() {
    let harness = harness(None, None);
    let request = HttpRequest::builder()
        .method("GET")
        .uri("/mcp/sse")
        .body(Body::empty())
        .expect("request");
    let (status, body, _) = send(&harness, request).await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).expect("utf8");
    assert!(text.contains("-32600"));
    assert!(text.contains("missing request"));
}

#[tokio::test]
async fn sse_notification_is_202() {
    let harness = harness(None, None);
    let envelope = r#"{"jsonrpc":"2.0","method":"echo","params":{}}"#;
    let encoded = url_encode(envelope);
    let request = HttpRequest::builder()
        .method("GET")
        .uri(format!("/mcp/sse?request={encoded}"))
        .body(Body::empty())
        .expect("request");
    let (status, body, _) = send(&harness, request).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_empty());
}

// =============================================================================
// Admin API
// =============================================================================

fn admin_post(uri: &str, payload: Value) -> HttpRequest<Body> {
    HttpRequest::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

#[tokio::test]
async fn admin_crud_round_trip() {
    let harness = harness(None, None);

    // Upsert. The sync against the unreachable upstream is non-fatal.
    let (status, body, _) = send(
        &harness,
        admin_post(
            "/v1/mcp/servers",
            json!({"name": "up", "url": "http://127.0.0.1:9/mcp"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let envelope: Value = serde_json::from_slice(&body).expect("envelope");
    assert_eq!(envelope["status"], "ok");
    assert_eq!(envelope["data"]["name"], "up");

    // List.
    let request = HttpRequest::builder()
        .method("GET")
        .uri("/v1/mcp/servers")
        .body(Body::empty())
        .expect("request");
    let (_, body, _) = send(&harness, request).await;
    let envelope: Value = serde_json::from_slice(&body).expect("envelope");
    assert_eq!(envelope["data"]["servers"][0]["name"], "up");
    assert_eq!(envelope["data"]["servers"][0]["transport"], "http");

    // Get one.
    let request = HttpRequest::builder()
        .method("GET")
        .uri("/v1/mcp/servers/up")
        .body(Body::empty())
        .expect("request");
    let (status, body, _) = send(&harness, request).await;
    assert_eq!(status, StatusCode::OK);
    let envelope: Value = serde_json::from_slice(&body).expect("envelope");
    assert_eq!(envelope["data"]["url"], "http://127.0.0.1:9/mcp");

    // Unknown server.
    let request = HttpRequest::builder()
        .method("GET")
        .uri("/v1/mcp/servers/ghost")
        .body(Body::empty())
        .expect("request");
    let (status, body, _) = send(&harness, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let envelope: Value = serde_json::from_slice(&body).expect("envelope");
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["error"]["code"], "not_found");

    // Delete.
    let request = HttpRequest::builder()
        .method("DELETE")
        .uri("/v1/mcp/servers/up")
        .body(Body::empty())
        .expect("request");
    let (status, _, _) = send(&harness, request).await;
    assert_eq!(status, StatusCode::OK);

    let request = HttpRequest::builder()
        .method("GET")
        .uri("/v1/mcp/servers/up")
        .body(Body::empty())
        .expect("request");
    let (status, _, _) = send(&harness, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_upsert_validates_config() {
    let harness = harness(None, None);
    let (status, body, _) = send(
        &harness,
        admin_post("/v1/mcp/servers", json!({"name": "", "url": "http://x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let envelope: Value = serde_json::from_slice(&body).expect("envelope");
    assert_eq!(envelope["error"]["message"], "name is required");
    assert!(!envelope["error"]["trace_id"]
        .as_str()
        .expect("trace")
        .is_empty());
}

#[tokio::test]
async fn admin_put_uses_path_name() {
    let harness = harness(None, None);
    let request = HttpRequest::builder()
        .method("PUT")
        .uri("/v1/mcp/servers/renamed")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"name": "ignored", "url": "http://127.0.0.1:9/mcp"}).to_string(),
        ))
        .expect("request");
    let (status, body, _) = send(&harness, request).await;

    assert_eq!(status, StatusCode::OK);
    let envelope: Value = serde_json::from_slice(&body).expect("envelope");
    assert_eq!(envelope["data"]["name"], "renamed");
    assert!(harness.state.manager.get("renamed").is_some());
    assert!(harness.state.manager.get("ignored").is_none());
}

#[tokio::test]
async fn admin_refresh_accepts_name_and_rejects_deep_paths() {
    let harness = harness(None, None);

    let (status, body, _) = send(
        &harness,
        admin_post("/v1/mcp/servers/up/refresh", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let envelope: Value = serde_json::from_slice(&body).expect("envelope");
    assert_eq!(envelope["data"]["refreshed"], json!(true));
    assert_eq!(envelope["data"]["name"], "up");

    let (status, body, _) = send(
        &harness,
        admin_post("/v1/mcp/servers/a/b/c", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let envelope: Value = serde_json::from_slice(&body).expect("envelope");
    assert_eq!(envelope["error"]["message"], "invalid path");
}

#[tokio::test]
async fn admin_get_rejects_nested_paths() {
    let harness = harness(None, None);
    let request = HttpRequest::builder()
        .method("GET")
        .uri("/v1/mcp/servers/a/b")
        .body(Body::empty())
        .expect("request");
    let (status, body, _) = send(&harness, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let envelope: Value = serde_json::from_slice(&body).expect("envelope");
    assert_eq!(envelope["error"]["message"], "invalid path");
}

/// Minimal percent-encoding for test URIs.
fn url_encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len() * 3);
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}
