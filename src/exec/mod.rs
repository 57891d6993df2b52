//! Captured-output command execution for the shell and code tools.
//!
//! A finished process is always a successful result, whatever its exit
//! code; only spawn failures and timeouts are errors. Output is
//! captured in full (the tools are single-shot, not streaming).

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecError;

/// Default time budget for shell and code executions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Captured outcome of a finished process.
#[derive(Debug, Clone, Serialize)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code; -1 when terminated by a signal.
    pub exit_code: i32,
}

/// Runs a command with captured output inside `working_dir`.
///
/// # Errors
///
/// Returns [`ExecError::TimedOut`] when the budget elapses and
/// [`ExecError::Io`] when the process cannot be spawned or awaited.
pub async fn run(
    command: &str,
    args: &[String],
    working_dir: &Path,
    timeout: Duration,
) -> Result<ExecResult, ExecError> {
    debug!(command = %command, args = args.len(), dir = %working_dir.display(), "executing command");

    let output = tokio::time::timeout(
        timeout,
        Command::new(command)
            .args(args)
            .current_dir(working_dir)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| ExecError::TimedOut {
        timeout_secs: timeout.as_secs(),
    })??;

    Ok(ExecResult {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Runs a code runtime (`python` or `node`) with the given arguments.
///
/// # Errors
///
/// Returns [`ExecError::UnsupportedRuntime`] for any other runtime
/// name, otherwise the same failures as [`run`].
pub async fn run_runtime(
    runtime: &str,
    args: &[String],
    working_dir: &Path,
    timeout: Duration,
) -> Result<ExecResult, ExecError> {
    let binary = match runtime.trim().to_lowercase().as_str() {
        "python" => "python",
        "node" => "node",
        _ => return Err(ExecError::UnsupportedRuntime),
    };
    run(binary, args, working_dir, timeout).await
}
