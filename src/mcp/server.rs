//! The MCP dispatcher and the stdio transport loop.
//!
//! A transport decodes bytes into an envelope and hands it here; the
//! dispatcher validates the protocol tag and version, selects the
//! method, consults the registry, and wraps handler outcomes into
//! responses. Notifications are dispatched like any request but the
//! transport suppresses the reply.
//!
//! # Method surface
//!
//! ```text
//! Client                          Server
//!   │                               │
//!   ├─── initialize ───────────────▶│  version + capabilities
//!   ├─── tools/list ───────────────▶│  sorted, normalised catalog
//!   ├─── tools/call ───────────────▶│  named handler, wrapped result
//!   ├─── mcp.capabilities ─────────▶│  legacy discovery
//!   ├─── <tool name> ──────────────▶│  direct dispatch, raw result
//!   │                               │
//! ```
//!
//! Handler failures keep their structured detail; the detail's kind
//! picks the outer integer code. A panicking handler is reported as an
//! internal error and never takes the transport down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::mcp::auth::Authenticator;
use crate::mcp::protocol::{
    parse_request, requested_protocol_version, ErrorDetail, ErrorKind, Request, Response,
    JSONRPC_VERSION, SERVER_NAME, SERVER_VERSION, SUPPORTED_PROTOCOL_VERSION,
};
use crate::mcp::registry::{Registry, ToolHandler, ToolInfo};

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session. Always
    /// false: clients re-list after federation changes.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server information for the initialize response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
        }
    }
}

/// Result of the initialize request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// The effective protocol version.
    pub protocol_version: String,
    /// Advertised capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identity.
    pub server_info: ServerInfo,
}

/// Legacy discovery payload for `mcp.capabilities`.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilitiesResult {
    /// The supported protocol version (legacy snake-case tag).
    pub protocol_version: String,
    /// The same catalog `tools/list` returns.
    pub tools: Vec<ToolInfo>,
}

/// Parameters for tools/call.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Box<RawValue>>,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Wire form of a tool-call result: a text rendering, the structured
/// handler value, and the same value under the legacy `result` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Content blocks.
    pub content: Vec<ToolContent>,
    /// The raw handler return.
    #[serde(
        rename = "structuredContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
    /// Legacy mirror of the handler return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolCallResult {
    /// Wraps a handler value into the rich wire form.
    #[must_use]
    pub fn wrap(value: Value) -> Self {
        let text = match &value {
            Value::String(text) => text.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        };
        Self {
            content: vec![ToolContent::Text { text }],
            structured_content: Some(value.clone()),
            result: Some(value),
        }
    }
}

/// The MCP dispatcher, shared by every transport.
pub struct McpServer {
    registry: Arc<Registry>,
    auth: Option<Authenticator>,
    auth_error: Option<String>,
}

impl McpServer {
    /// Creates a dispatcher over a shared registry.
    ///
    /// `auth_error` is the sticky configuration failure: when set, every
    /// protected-transport request replies with an internal error. The
    /// stdio transport ignores both fields.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        auth: Option<Authenticator>,
        auth_error: Option<String>,
    ) -> Self {
        Self {
            registry,
            auth,
            auth_error,
        }
    }

    /// The registry backing this dispatcher.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Checks the sticky configuration error and bearer auth for a
    /// protected transport. Returns the ready error response, if any.
    #[must_use]
    pub fn transport_guard(&self, authorization: Option<&str>) -> Option<Response> {
        if let Some(message) = &self.auth_error {
            return Some(Response::failure(
                None,
                ErrorKind::Internal,
                ErrorDetail::internal(message.clone()),
            ));
        }
        if let Some(auth) = &self.auth {
            if let Err(detail) = auth.validate_bearer(authorization) {
                return Some(Response::failure(None, ErrorKind::Unauthorized, detail));
            }
        }
        None
    }

    /// Parses and dispatches one transport payload.
    ///
    /// The boolean is true when the payload was a notification and the
    /// transport must suppress the response.
    pub async fn handle_payload(&self, payload: &[u8]) -> (Response, bool) {
        match parse_request(payload) {
            Err(err) => (err.into_response(), false),
            Ok(req) => {
                let notification = req.is_notification();
                (self.handle_request(req).await, notification)
            }
        }
    }

    /// Dispatches a parsed request.
    pub async fn handle_request(&self, req: Request) -> Response {
        if req.jsonrpc != JSONRPC_VERSION {
            return Response::failure(
                req.id,
                ErrorKind::InvalidRequest,
                ErrorDetail::invalid_request("invalid jsonrpc version"),
            );
        }
        let requested = match requested_protocol_version(req.params.as_deref()) {
            Ok(version) => version,
            Err(err) => {
                return Response::failure(
                    req.id,
                    ErrorKind::InvalidParams,
                    ErrorDetail::invalid_params(err.to_string()),
                );
            }
        };

        debug!(method = %req.method, "dispatching request");
        let method = req.method.clone();
        match method.as_str() {
            "initialize" => self.handle_initialize(req.id, requested),
            "tools/list" => self.handle_tools_list(req.id, req.params.as_deref()),
            "tools/call" => self.handle_tools_call(req.id, req.params).await,
            "mcp.capabilities" => self.handle_capabilities(req.id),
            _ => self.handle_direct(req).await,
        }
    }

    fn handle_initialize(&self, id: Option<Box<RawValue>>, requested: Option<String>) -> Response {
        let result = InitializeResult {
            protocol_version: requested
                .unwrap_or_else(|| SUPPORTED_PROTOCOL_VERSION.to_string()),
            capabilities: ServerCapabilities {
                tools: ToolCapabilities::default(),
            },
            server_info: ServerInfo::default(),
        };
        success_payload(id, &result)
    }

    fn handle_tools_list(&self, id: Option<Box<RawValue>>, params: Option<&RawValue>) -> Response {
        if let Some(raw) = params {
            let text = raw.get().trim();
            if !text.is_empty()
                && serde_json::from_str::<serde_json::Map<String, Value>>(text).is_err()
            {
                return Response::failure(
                    id,
                    ErrorKind::InvalidParams,
                    ErrorDetail::invalid_params("params must be an object"),
                );
            }
        }
        success_payload(
            id,
            &serde_json::json!({ "tools": self.registry.list() }),
        )
    }

    fn handle_capabilities(&self, id: Option<Box<RawValue>>) -> Response {
        let result = CapabilitiesResult {
            protocol_version: SUPPORTED_PROTOCOL_VERSION.to_string(),
            tools: self.registry.list(),
        };
        success_payload(id, &result)
    }

    async fn handle_tools_call(
        &self,
        id: Option<Box<RawValue>>,
        params: Option<Box<RawValue>>,
    ) -> Response {
        let Some(raw) = params else {
            return Response::failure(
                id,
                ErrorKind::InvalidParams,
                ErrorDetail::invalid_params("params are required"),
            );
        };
        let parsed: ToolCallParams = match serde_json::from_str(raw.get()) {
            Ok(parsed) => parsed,
            Err(_) => {
                return Response::failure(
                    id,
                    ErrorKind::InvalidParams,
                    ErrorDetail::invalid_params("invalid params"),
                );
            }
        };
        if parsed.name.is_empty() {
            return Response::failure(
                id,
                ErrorKind::InvalidParams,
                ErrorDetail::invalid_params("name is required"),
            );
        }

        let Some(handler) = self
            .registry
            .get(&parsed.name)
            .and_then(|tool| tool.handler)
        else {
            return Response::failure(
                id,
                ErrorKind::MethodNotFound,
                ErrorDetail::method_not_found("unknown tool"),
            );
        };

        match Self::invoke(&parsed.name, &handler, parsed.arguments).await {
            Ok(value) => success_payload(id, &ToolCallResult::wrap(value)),
            Err(detail) => handler_failure(id, detail),
        }
    }

    async fn handle_direct(&self, req: Request) -> Response {
        let Some(handler) = self.registry.get(&req.method).and_then(|tool| tool.handler) else {
            return Response::failure(
                req.id,
                ErrorKind::MethodNotFound,
                ErrorDetail::method_not_found("unknown method"),
            );
        };

        match Self::invoke(&req.method, &handler, req.params).await {
            Ok(value) => Response::success(req.id, value),
            Err(detail) => handler_failure(req.id, detail),
        }
    }

    /// Runs a handler with panic isolation. A panic is logged and
    /// reported as an internal error without implementation detail.
    async fn invoke(
        name: &str,
        handler: &ToolHandler,
        arguments: Option<Box<RawValue>>,
    ) -> Result<Value, ErrorDetail> {
        match AssertUnwindSafe(handler(arguments)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(tool = %name, "tool handler panicked");
                Err(ErrorDetail::internal("internal error"))
            }
        }
    }

    /// Runs the stdio transport: one envelope per input line, one
    /// response per line, strict arrival order, no replies for
    /// notifications. Ends cleanly at end-of-input; a write error is
    /// fatal.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error when reading or writing fails.
    pub async fn serve_stdio<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let payload = line.trim();
            if payload.is_empty() {
                continue;
            }

            let (response, notification) = self.handle_payload(payload.as_bytes()).await;
            if notification {
                continue;
            }

            let mut encoded = serde_json::to_vec(&response)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }

        Ok(())
    }
}

/// Serialises a payload into a success response; a serialisation
/// failure (never expected for these shapes) degrades to internal.
fn success_payload<T: Serialize>(id: Option<Box<RawValue>>, payload: &T) -> Response {
    match serde_json::to_value(payload) {
        Ok(value) => Response::success(id, value),
        Err(err) => {
            warn!(error = %err, "failed to serialise result payload");
            Response::failure(
                id,
                ErrorKind::Internal,
                ErrorDetail::internal("internal error"),
            )
        }
    }
}

/// Maps a handler error detail to its protocol response; the detail is
/// carried through verbatim apart from the guaranteed trace.
fn handler_failure(id: Option<Box<RawValue>>, detail: ErrorDetail) -> Response {
    let kind = detail.resolved_kind();
    Response::failure(id, kind, detail)
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("auth_enabled", &self.auth.as_ref().map(Authenticator::enabled))
            .field("auth_error", &self.auth_error)
            .finish_non_exhaustive()
    }
}
