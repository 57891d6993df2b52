//! HTTP surface: MCP transports plus the federation admin API.
//!
//! The host router mounts three surfaces over one shared state:
//!
//! - `POST /mcp` — single-shot JSON-RPC (JSON or SSE reply per Accept)
//! - `GET /mcp/sse` — single-shot SSE with the envelope in the query
//! - `/v1/mcp/servers…` — upstream server CRUD + refresh
//!
//! Each connection is dispatched independently by the runtime; there
//! are no ordering guarantees between concurrent requests.

pub mod admin;
pub mod transport;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::mcp::server::McpServer;
use crate::remote::manager::RemoteManager;

/// Shared state behind every HTTP route.
pub struct AppState {
    /// The MCP dispatcher (owns the registry and auth).
    pub server: McpServer,
    /// The federation manager.
    pub manager: Arc<RemoteManager>,
}

/// Builds the axum router over the shared state.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mcp", post(transport::mcp_post))
        .route("/mcp/sse", get(transport::mcp_sse))
        .route(
            "/v1/mcp/servers",
            get(admin::list_servers).post(admin::upsert_server),
        )
        .route(
            "/v1/mcp/servers/{*rest}",
            get(admin::get_server)
                .put(admin::put_server)
                .delete(admin::delete_server)
                .post(admin::refresh_server),
        )
        .with_state(state)
}
