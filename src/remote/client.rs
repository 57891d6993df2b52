//! JSON-RPC client for upstream MCP servers.
//!
//! One request per call, fixed identifier, 30 second timeout. The
//! `http` transport POSTs the envelope; the `sse` transport GETs with
//! the envelope URL-encoded in the `request` query parameter and reads
//! a single event frame back.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::RemoteError;
use crate::mcp::protocol::{Request, Response, JSONRPC_VERSION};
use crate::mcp::registry::ToolsListResult;
use crate::remote::config::ServerConfig;

/// Default upstream request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The calls the federation manager makes against an upstream server.
///
/// The manager takes this as a trait object so sync semantics are
/// testable without a network.
#[async_trait]
pub trait RemoteToolsApi: Send + Sync {
    /// Fetches the upstream tool catalog.
    async fn tools_list(&self, config: &ServerConfig) -> Result<ToolsListResult, RemoteError>;

    /// Invokes an upstream tool, forwarding `arguments` verbatim.
    /// Returns the upstream result value untouched.
    async fn tools_call(
        &self,
        config: &ServerConfig,
        tool: &str,
        arguments: Option<Box<RawValue>>,
    ) -> Result<Value, RemoteError>;
}

#[derive(Serialize)]
struct CallParams<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<&'a RawValue>,
}

/// reqwest-backed implementation of [`RemoteToolsApi`].
pub struct HttpRemoteClient {
    http: reqwest::Client,
}

impl HttpRemoteClient {
    /// Creates a client with the default 30 second timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("failed to build http client"),
        }
    }

    async fn round_trip(
        &self,
        config: &ServerConfig,
        request: &Request,
    ) -> Result<Response, RemoteError> {
        let payload = serde_json::to_string(request)?;
        let transport = config.transport.trim().to_lowercase();
        match transport.as_str() {
            "" | "http" => self.round_trip_http(config, payload).await,
            "sse" => self.round_trip_sse(config, payload).await,
            other => Err(RemoteError::UnsupportedTransport(other.to_string())),
        }
    }

    async fn round_trip_http(
        &self,
        config: &ServerConfig,
        payload: String,
    ) -> Result<Response, RemoteError> {
        let builder = self
            .http
            .post(&config.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        let raw = apply_headers(builder, config).send().await?.bytes().await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn round_trip_sse(
        &self,
        config: &ServerConfig,
        payload: String,
    ) -> Result<Response, RemoteError> {
        let mut url = reqwest::Url::parse(&config.url)
            .map_err(|_| RemoteError::InvalidUrl(config.url.clone()))?;
        url.query_pairs_mut().append_pair("request", &payload);

        let builder = self.http.get(url).header(ACCEPT, "text/event-stream");
        let body = apply_headers(builder, config).send().await?.text().await?;
        let message = read_sse_message(&body)?;
        Ok(serde_json::from_str(message)?)
    }
}

impl Default for HttpRemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteToolsApi for HttpRemoteClient {
    async fn tools_list(&self, config: &ServerConfig) -> Result<ToolsListResult, RemoteError> {
        let request = Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: fixed_id(),
            method: "tools/list".to_string(),
            params: None,
        };
        let response = self.round_trip(config, &request).await?;
        if let Some(error) = response.error {
            return Err(RemoteError::Upstream(error.message));
        }
        Ok(serde_json::from_value(
            response.result.unwrap_or(Value::Null),
        )?)
    }

    async fn tools_call(
        &self,
        config: &ServerConfig,
        tool: &str,
        arguments: Option<Box<RawValue>>,
    ) -> Result<Value, RemoteError> {
        let params = serde_json::to_string(&CallParams {
            name: tool,
            arguments: arguments.as_deref(),
        })?;
        let request = Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: fixed_id(),
            method: "tools/call".to_string(),
            params: RawValue::from_string(params).ok(),
        };
        let response = self.round_trip(config, &request).await?;
        if let Some(error) = response.error {
            return Err(RemoteError::Upstream(error.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

/// The fixed JSON-RPC identifier used for every upstream call.
fn fixed_id() -> Option<Box<RawValue>> {
    RawValue::from_string("1".to_string()).ok()
}

/// Applies the configured bearer token and header overrides. A custom
/// Authorization header wins over the token.
fn apply_headers(
    mut builder: reqwest::RequestBuilder,
    config: &ServerConfig,
) -> reqwest::RequestBuilder {
    if !config.authorization_token.is_empty() && !has_authorization_header(&config.headers) {
        builder = builder.header(
            AUTHORIZATION,
            format!("Bearer {}", config.authorization_token),
        );
    }
    for (key, value) in &config.headers {
        if key.trim().is_empty() {
            continue;
        }
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder
}

fn has_authorization_header(headers: &BTreeMap<String, String>) -> bool {
    headers.keys().any(|key| key.eq_ignore_ascii_case("authorization"))
}

/// Extracts the payload of the first `data:` line of an SSE body.
fn read_sse_message(body: &str) -> Result<&str, RemoteError> {
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            let data = rest.trim();
            if data.is_empty() {
                return Err(RemoteError::EmptySse);
            }
            return Ok(data);
        }
    }
    Err(RemoteError::EmptySse)
}
