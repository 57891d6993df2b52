//! open-sandbox: sandbox capability server speaking the Model Context
//! Protocol.
//!
//! The crate exposes a sandbox's capabilities (workspace files, shell,
//! code runtimes, federated upstream tools) to external callers through
//! a JSON-RPC 2.0 dispatch plane with three transports: line-delimited
//! stdio, single-shot HTTP, and Server-Sent Events. Bearer-token
//! authentication protects the HTTP transports; federation aggregates
//! upstream MCP servers into the local catalog under an
//! `ext.<server>.` prefix.
//!
//! # Modules
//!
//! - [`config`] — env parsing and default state locations
//! - [`error`] — error types
//! - [`exec`] — captured-output command execution
//! - [`http`] — HTTP/SSE transports and federation admin API
//! - [`mcp`] — protocol codec, registry, dispatcher, auth
//! - [`remote`] — upstream server store, client and sync
//! - [`tools`] — local tool descriptors and handlers
//! - [`workspace`] — path confinement and file helpers

pub mod config;
pub mod error;
pub mod exec;
pub mod http;
pub mod mcp;
pub mod remote;
pub mod tools;
pub mod workspace;
