//! open-sandbox: sandbox capability server speaking the Model Context
//! Protocol.
//!
//! Two modes share one catalog and one persisted federation state:
//! `serve` exposes the HTTP/SSE transports plus the admin API, `stdio`
//! runs the line-delimited transport for a directly attached client.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use open_sandbox::config;
use open_sandbox::http::{self, AppState};
use open_sandbox::mcp::auth::Authenticator;
use open_sandbox::mcp::server::McpServer;
use open_sandbox::remote::manager::RemoteManager;
use open_sandbox::tools;

/// Sandbox capability server speaking the Model Context Protocol.
///
/// Exposes workspace files, shell and code execution, and federated
/// upstream tools over stdio, HTTP and SSE transports.
#[derive(Parser, Debug)]
#[command(name = "open-sandbox")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP over HTTP and SSE with the federation admin API.
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,

        /// Path to the persisted upstream-server list
        #[arg(long, value_name = "FILE")]
        servers_file: Option<PathBuf>,

        /// Workspace root for the file and shell tools
        #[arg(long, value_name = "DIR")]
        workspace: Option<PathBuf>,
    },

    /// Serve MCP over line-delimited stdio.
    Stdio {
        /// Path to the persisted upstream-server list
        #[arg(long, value_name = "FILE")]
        servers_file: Option<PathBuf>,

        /// Workspace root for the file and shell tools
        #[arg(long, value_name = "DIR")]
        workspace: Option<PathBuf>,
    },
}

/// Determines the log level from CLI arguments.
fn get_log_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves the state-file and workspace paths, falling back to the
/// platform defaults, and makes sure the workspace exists.
fn resolve_paths(
    servers_file: Option<PathBuf>,
    workspace: Option<PathBuf>,
) -> Result<(PathBuf, PathBuf), String> {
    let servers_path = servers_file
        .or_else(config::default_servers_path)
        .ok_or_else(|| "cannot determine state directory".to_string())?;
    let workspace_root = workspace
        .or_else(config::default_workspace_dir)
        .ok_or_else(|| "cannot determine workspace directory".to_string())?;
    std::fs::create_dir_all(&workspace_root)
        .map_err(|e| format!("workspace init failed: {e}"))?;
    Ok((servers_path, workspace_root))
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(get_log_level(args.verbose, args.quiet));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting open-sandbox server"
    );

    match args.command {
        Command::Serve {
            addr,
            servers_file,
            workspace,
        } => run_serve(addr, servers_file, workspace),
        Command::Stdio {
            servers_file,
            workspace,
        } => run_stdio(servers_file, workspace),
    }
}

fn run_serve(
    addr: SocketAddr,
    servers_file: Option<PathBuf>,
    workspace: Option<PathBuf>,
) -> ExitCode {
    let (servers_path, workspace_root) = match resolve_paths(servers_file, workspace) {
        Ok(paths) => paths,
        Err(message) => {
            error!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let registry = Arc::new(tools::build_registry(&workspace_root));
    let manager = match RemoteManager::new(&servers_path) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!(error = %e, "external mcp config load failed");
            return ExitCode::FAILURE;
        }
    };

    // The sticky auth-config error: captured once, replayed on every
    // protected request.
    let (auth, auth_error) = match Authenticator::from_env() {
        Ok(auth) => {
            if auth.enabled() {
                info!("Bearer authentication enabled");
            }
            (Some(auth), None)
        }
        Err(e) => {
            error!(error = %e, "auth configuration invalid; requests will fail");
            (None, Some(e.to_string()))
        }
    };

    let state = Arc::new(AppState {
        server: McpServer::new(Arc::clone(&registry), auth, auth_error),
        manager: Arc::clone(&manager),
    });

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to create runtime");
            return ExitCode::FAILURE;
        }
    };

    let result: std::io::Result<()> = runtime.block_on(async {
        manager.sync_registry(&registry).await;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %addr, workspace = %workspace_root.display(), "MCP server listening");
        axum::serve(listener, http::router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

fn run_stdio(servers_file: Option<PathBuf>, workspace: Option<PathBuf>) -> ExitCode {
    let (servers_path, workspace_root) = match resolve_paths(servers_file, workspace) {
        Ok(paths) => paths,
        Err(message) => {
            error!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let registry = Arc::new(tools::build_registry(&workspace_root));
    let manager = match RemoteManager::new(&servers_path) {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "external mcp config load failed");
            return ExitCode::FAILURE;
        }
    };

    // Stdio never authenticates.
    let server = McpServer::new(Arc::clone(&registry), None, None);

    // Current-thread runtime: stdio is a single connection with strict
    // FIFO ordering.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to create runtime");
            return ExitCode::FAILURE;
        }
    };

    info!("MCP server ready on stdio");
    let result = runtime.block_on(async {
        manager.sync_registry(&registry).await;
        server
            .serve_stdio(tokio::io::stdin(), tokio::io::stdout())
            .await
    });

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to install shutdown signal handler");
        return;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn log_level_mapping() {
        assert_eq!(get_log_level(0, false), Level::INFO);
        assert_eq!(get_log_level(1, false), Level::DEBUG);
        assert_eq!(get_log_level(5, false), Level::TRACE);
        assert_eq!(get_log_level(3, true), Level::ERROR);
    }
}
