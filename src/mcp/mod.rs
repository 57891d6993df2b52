//! Model Context Protocol (MCP) dispatch plane.
//!
//! This module is the protocol core: a JSON-RPC 2.0 router that
//! advertises a dynamically composed tool catalog, invokes local tool
//! handlers, and serves every transport from one shared registry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        MCP Server                            │
//! │                                                              │
//! │   ┌────────────┐    ┌────────────┐    ┌─────────────┐        │
//! │   │ Transports │───▶│ Dispatcher │───▶│  Registry   │        │
//! │   │ stdio/http │    │  (server)  │    │ (tools map) │        │
//! │   │   /sse     │    └────────────┘    └─────────────┘        │
//! │   └────────────┘          │                  ▲               │
//! │         │                 ▼                  │               │
//! │         │          ┌────────────┐    ┌──────────────┐        │
//! │         └─────────▶│    Auth    │    │  Federation  │        │
//! │                    │  (bearer)  │    │ (remote mgr) │        │
//! │                    └────────────┘    └──────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The registry is the only process-wide mutable state; it takes
//! concurrent readers and exclusive writers, and is never held across a
//! handler invocation or a network call.

pub mod auth;
pub mod protocol;
pub mod registry;
pub mod server;

pub use auth::{AuthConfig, Authenticator};
pub use protocol::{ErrorDetail, ErrorKind, Request, Response, SUPPORTED_PROTOCOL_VERSION};
pub use registry::{Registry, Tool, ToolInfo};
pub use server::McpServer;
