//! Process configuration helpers.
//!
//! Authentication is environment-driven (`MCP_AUTH_*`, see
//! [`crate::mcp::auth::AuthConfig`]); this module holds the shared env
//! parsing plus the platform-specific default locations for persistent
//! state and the sandbox workspace.
//!
//! # Default Locations
//!
//! - State directory: `~/.open-sandbox/`
//! - Upstream server list: `~/.open-sandbox/mcp-servers.json`
//! - Workspace root: `~/.open-sandbox/workspace/`
//!
//! Both can be overridden on the command line.

use std::path::PathBuf;

/// Parses a truthy environment variable.
///
/// Accepts `1`, `true`, `yes` and `y` (case-insensitive); everything
/// else, including an unset variable, is false.
#[must_use]
pub fn read_bool_env(key: &str) -> bool {
    let raw = std::env::var(key).unwrap_or_default();
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}

/// Returns the default state directory (`~/.open-sandbox`).
#[must_use]
pub fn default_state_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".open-sandbox"))
}

/// Returns the default path of the persisted upstream-server list.
#[must_use]
pub fn default_servers_path() -> Option<PathBuf> {
    default_state_dir().map(|dir| dir.join("mcp-servers.json"))
}

/// Returns the default workspace root for the file and shell tools.
#[must_use]
pub fn default_workspace_dir() -> Option<PathBuf> {
    default_state_dir().map(|dir| dir.join("workspace"))
}
