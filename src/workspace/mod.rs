//! Workspace path confinement and file helpers.
//!
//! Every file tool resolves its path against the configured workspace
//! root before touching the filesystem: relative paths are joined to
//! the root, traversal components are normalised lexically, and the
//! result must stay inside the root. Validation happens before any IO.

use std::path::{Component, Path, PathBuf};

use crate::error::WorkspaceError;

/// Lexically normalises a path: `.` components are dropped and `..`
/// pops the previous component without consulting the filesystem.
#[must_use]
pub fn normalise(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    // Keep leading `..` of relative paths; for rooted
                    // paths the pop already stopped at the root.
                    if !cleaned.has_root() {
                        cleaned.push(Component::ParentDir);
                    }
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Resolves a raw path argument inside the workspace root.
///
/// # Errors
///
/// Returns [`WorkspaceError::PathRequired`] for an empty argument and
/// [`WorkspaceError::OutsideWorkspace`] when the normalised result
/// escapes the root.
pub fn resolve(root: &Path, raw: &str) -> Result<PathBuf, WorkspaceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WorkspaceError::PathRequired);
    }
    let candidate = Path::new(trimmed);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = normalise(&joined);
    if !resolved.starts_with(normalise(root)) {
        return Err(WorkspaceError::OutsideWorkspace);
    }
    Ok(resolved)
}

/// Like [`resolve`], but an empty argument means the root itself.
///
/// # Errors
///
/// Returns [`WorkspaceError::OutsideWorkspace`] when a non-empty
/// argument escapes the root.
pub fn resolve_dir(root: &Path, raw: &str) -> Result<PathBuf, WorkspaceError> {
    if raw.trim().is_empty() {
        return Ok(root.to_path_buf());
    }
    resolve(root, raw)
}

/// Reads a file to a string.
///
/// # Errors
///
/// Returns the underlying IO failure.
pub async fn read(path: &Path) -> Result<String, WorkspaceError> {
    Ok(tokio::fs::read_to_string(path).await?)
}

/// Writes a file, creating parent directories as needed.
///
/// # Errors
///
/// Returns the underlying IO failure.
pub async fn write(path: &Path, content: &str) -> Result<(), WorkspaceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// Lists the entry names of a directory, sorted.
///
/// # Errors
///
/// Returns the underlying IO failure.
pub async fn list(path: &Path) -> Result<Vec<String>, WorkspaceError> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Returns the lines of a file containing `query`.
///
/// # Errors
///
/// Returns [`WorkspaceError::EmptyArgument`] for an empty query, or
/// the underlying IO failure.
pub async fn search(path: &Path, query: &str) -> Result<Vec<String>, WorkspaceError> {
    if query.is_empty() {
        return Err(WorkspaceError::EmptyArgument("query"));
    }
    let content = read(path).await?;
    Ok(content
        .lines()
        .filter(|line| line.contains(query))
        .map(ToString::to_string)
        .collect())
}

/// Replaces every occurrence of `search` in a file, returning the
/// number of occurrences replaced.
///
/// # Errors
///
/// Returns [`WorkspaceError::EmptyArgument`] for an empty search
/// string, or the underlying IO failure.
pub async fn replace(path: &Path, search: &str, replace: &str) -> Result<usize, WorkspaceError> {
    if search.is_empty() {
        return Err(WorkspaceError::EmptyArgument("search"));
    }
    let content = read(path).await?;
    let count = content.matches(search).count();
    let updated = content.replace(search, replace);
    tokio::fs::write(path, updated).await?;
    Ok(count)
}
