//! Upstream MCP server configuration.
//!
//! Configurations persist as a single JSON document of the form
//! `{"servers":[…]}`, sorted by name. A missing file is an empty
//! configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Configuration of one upstream MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique server name; becomes part of the `ext.<name>.` prefix.
    #[serde(default)]
    pub name: String,
    /// Target URL of the upstream `/mcp` (or SSE) endpoint.
    #[serde(default)]
    pub url: String,
    /// Transport tag: `http` (default) or `sse`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transport: String,
    /// Bearer token applied unless the custom headers already carry an
    /// Authorization entry.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub authorization_token: String,
    /// Arbitrary header overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Exact-match tool admission allow list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_allow: Vec<String>,
    /// Exact-match tool admission deny list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_deny: Vec<String>,
    /// Glob tool admission allow list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_allow_glob: Vec<String>,
    /// Glob tool admission deny list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_deny_glob: Vec<String>,
}

/// The persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Configured servers, sorted by name on disk.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}
