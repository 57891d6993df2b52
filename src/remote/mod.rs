//! Federation with upstream MCP servers.
//!
//! Upstream servers are configured through the admin API, persisted to
//! one JSON file, and materialised into the shared registry on explicit
//! sync. Each admitted upstream tool appears locally as
//! `ext.<server>.<tool>` with a forwarding handler.

pub mod client;
pub mod config;
pub mod filter;
pub mod manager;

pub use client::{HttpRemoteClient, RemoteToolsApi};
pub use config::{ConfigFile, ServerConfig};
pub use filter::ToolFilter;
pub use manager::RemoteManager;
