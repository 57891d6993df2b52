//! Error types for open-sandbox.
//!
//! Auth configuration failures are sticky: captured once at server
//! construction and replayed as internal errors on every protected
//! request. Store and workspace failures surface through the admin API
//! and tool handlers respectively; none of these messages ever include
//! key material or token contents.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building the authenticator from configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Auth was enabled without a key source.
    #[error("jwt secret or public key required")]
    MissingKeySource,

    /// Both a symmetric secret and a public key were configured.
    #[error("only one jwt key source is allowed")]
    ConflictingKeySources,

    /// The configured public key was not RSA, ECDSA or Ed25519 PEM.
    #[error("unsupported public key format")]
    UnsupportedPublicKey,
}

/// Errors from the persisted upstream-server store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A server configuration was missing its name.
    #[error("name is required")]
    NameRequired,

    /// A server configuration was missing its URL.
    #[error("url is required")]
    UrlRequired,

    /// The state file could not be read.
    #[error("failed to read state file: {path}")]
    Read {
        /// Path to the state file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The state file could not be parsed.
    #[error("failed to parse state file: {path}")]
    Parse {
        /// Path to the state file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The state file could not be written.
    #[error("failed to write state file: {path}")]
    Write {
        /// Path to the state file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the remote MCP client.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The configured transport tag was neither `http` nor `sse`.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// The configured URL did not parse.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// The HTTP round trip failed.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not a JSON-RPC envelope.
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// An SSE response carried no `data:` line.
    #[error("empty sse response")]
    EmptySse,

    /// The upstream replied with a JSON-RPC error.
    #[error("{0}")]
    Upstream(String),
}

/// Errors from shell and code-runtime execution.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The command exceeded its time budget.
    #[error("command timed out after {timeout_secs}s")]
    TimedOut {
        /// The budget that was exceeded, in seconds.
        timeout_secs: u64,
    },

    /// The requested code runtime is not available.
    #[error("unsupported runtime")]
    UnsupportedRuntime,

    /// Spawning or waiting on the process failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Errors from workspace path resolution and file operations.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// No path was supplied where one is required.
    #[error("path is required")]
    PathRequired,

    /// The resolved path escaped the workspace root.
    #[error("path must be within workspace")]
    OutsideWorkspace,

    /// A required argument was empty.
    #[error("{0} must not be empty")]
    EmptyArgument(&'static str),

    /// The underlying file operation failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
