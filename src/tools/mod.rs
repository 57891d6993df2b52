//! Local tool descriptors and handlers.
//!
//! These are the sandbox capabilities exposed through the dispatch
//! plane: workspace file operations, shell execution and the code
//! runtime launcher. Each builder returns a complete descriptor;
//! [`build_registry`] assembles the startup catalog.
//!
//! Handlers split failures the same way throughout: a missing or
//! malformed argument (including a path escaping the workspace) is
//! invalid-params, a failing operation is a tool error.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{json, Value};

use crate::error::WorkspaceError;
use crate::exec;
use crate::mcp::protocol::ErrorDetail;
use crate::mcp::registry::{handler, JsonSchema, PermissionMeta, Registry, Tool, ToolSchema};
use crate::workspace;

#[derive(Debug, Default, Deserialize)]
struct FilePathParams {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Deserialize)]
struct FileWriteParams {
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct FileSearchParams {
    #[serde(default)]
    path: String,
    #[serde(default)]
    query: String,
}

#[derive(Debug, Deserialize)]
struct FileReplaceParams {
    #[serde(default)]
    path: String,
    #[serde(default)]
    search: String,
    #[serde(default)]
    replace: String,
}

#[derive(Debug, Deserialize)]
struct ShellExecParams {
    #[serde(default)]
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    working_dir: String,
}

#[derive(Debug, Deserialize)]
struct CodeExecParams {
    #[serde(default)]
    runtime: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    working_dir: String,
}

/// Parses required handler params; absent params are invalid.
fn parse_params<T: DeserializeOwned>(params: Option<&RawValue>) -> Result<T, ErrorDetail> {
    let raw = params.ok_or_else(|| ErrorDetail::invalid_params("invalid params"))?;
    serde_json::from_str(raw.get()).map_err(|_| ErrorDetail::invalid_params("invalid params"))
}

/// Parses optional handler params; absent params mean defaults.
fn parse_optional_params<T: DeserializeOwned + Default>(
    params: Option<&RawValue>,
) -> Result<T, ErrorDetail> {
    match params {
        None => Ok(T::default()),
        Some(_) => parse_params(params),
    }
}

/// Maps a workspace failure onto the invalid-params / tool-error split.
fn workspace_failure(err: &WorkspaceError) -> ErrorDetail {
    match err {
        WorkspaceError::Io(_) => ErrorDetail::tool_error(err.to_string()),
        _ => ErrorDetail::invalid_params(err.to_string()),
    }
}

fn object_schema(value: Value) -> JsonSchema {
    value.as_object().cloned().unwrap_or_default()
}

fn path_only_schema() -> ToolSchema {
    ToolSchema {
        input: Some(object_schema(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative or absolute path"}
            },
            "required": ["path"]
        }))),
        output: None,
    }
}

/// The `file.read` tool.
pub fn file_read(root: &Path) -> Tool {
    let root = root.to_path_buf();
    Tool {
        name: "file.read".to_string(),
        version: "v1".to_string(),
        permissions: PermissionMeta::allowed("workspace"),
        schema: path_only_schema(),
        handler: Some(handler(move |params: Option<Box<RawValue>>| {
            let root = root.clone();
            async move {
                let payload: FilePathParams = parse_params(params.as_deref())?;
                let path =
                    workspace::resolve(&root, &payload.path).map_err(|e| workspace_failure(&e))?;
                let content = workspace::read(&path)
                    .await
                    .map_err(|e| ErrorDetail::tool_error(e.to_string()))?;
                Ok(json!({ "content": content }))
            }
        })),
    }
}

/// The `file.write` tool.
pub fn file_write(root: &Path) -> Tool {
    let root = root.to_path_buf();
    Tool {
        name: "file.write".to_string(),
        version: "v1".to_string(),
        permissions: PermissionMeta::allowed("workspace"),
        schema: ToolSchema {
            input: Some(object_schema(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }))),
            output: None,
        },
        handler: Some(handler(move |params: Option<Box<RawValue>>| {
            let root = root.clone();
            async move {
                let payload: FileWriteParams = parse_params(params.as_deref())?;
                let path =
                    workspace::resolve(&root, &payload.path).map_err(|e| workspace_failure(&e))?;
                workspace::write(&path, &payload.content)
                    .await
                    .map_err(|e| ErrorDetail::tool_error(e.to_string()))?;
                Ok(json!({ "path": path.display().to_string() }))
            }
        })),
    }
}

/// The `file.list` tool. Empty params list the workspace root.
pub fn file_list(root: &Path) -> Tool {
    let root = root.to_path_buf();
    Tool {
        name: "file.list".to_string(),
        version: "v1".to_string(),
        permissions: PermissionMeta::allowed("workspace"),
        schema: ToolSchema {
            input: Some(object_schema(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory to list; defaults to the workspace root"}
                }
            }))),
            output: None,
        },
        handler: Some(handler(move |params: Option<Box<RawValue>>| {
            let root = root.clone();
            async move {
                let payload: FilePathParams = parse_optional_params(params.as_deref())?;
                let path = workspace::resolve_dir(&root, &payload.path)
                    .map_err(|e| workspace_failure(&e))?;
                let entries = workspace::list(&path)
                    .await
                    .map_err(|e| ErrorDetail::tool_error(e.to_string()))?;
                Ok(json!({ "entries": entries }))
            }
        })),
    }
}

/// The `file.search` tool.
pub fn file_search(root: &Path) -> Tool {
    let root = root.to_path_buf();
    Tool {
        name: "file.search".to_string(),
        version: "v1".to_string(),
        permissions: PermissionMeta::allowed("workspace"),
        schema: ToolSchema {
            input: Some(object_schema(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "query": {"type": "string"}
                },
                "required": ["path", "query"]
            }))),
            output: None,
        },
        handler: Some(handler(move |params: Option<Box<RawValue>>| {
            let root = root.clone();
            async move {
                let payload: FileSearchParams = parse_params(params.as_deref())?;
                let path =
                    workspace::resolve(&root, &payload.path).map_err(|e| workspace_failure(&e))?;
                let matches = workspace::search(&path, &payload.query)
                    .await
                    .map_err(|e| match &e {
                        WorkspaceError::EmptyArgument(_) => workspace_failure(&e),
                        _ => ErrorDetail::tool_error(e.to_string()),
                    })?;
                Ok(json!({ "matches": matches }))
            }
        })),
    }
}

/// The `file.replace` tool.
pub fn file_replace(root: &Path) -> Tool {
    let root = root.to_path_buf();
    Tool {
        name: "file.replace".to_string(),
        version: "v1".to_string(),
        permissions: PermissionMeta::allowed("workspace"),
        schema: ToolSchema {
            input: Some(object_schema(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "search": {"type": "string"},
                    "replace": {"type": "string"}
                },
                "required": ["path", "search", "replace"]
            }))),
            output: None,
        },
        handler: Some(handler(move |params: Option<Box<RawValue>>| {
            let root = root.clone();
            async move {
                let payload: FileReplaceParams = parse_params(params.as_deref())?;
                let path =
                    workspace::resolve(&root, &payload.path).map_err(|e| workspace_failure(&e))?;
                let count = workspace::replace(&path, &payload.search, &payload.replace)
                    .await
                    .map_err(|e| match &e {
                        WorkspaceError::EmptyArgument(_) => workspace_failure(&e),
                        _ => ErrorDetail::tool_error(e.to_string()),
                    })?;
                Ok(json!({ "count": count }))
            }
        })),
    }
}

/// The `shell.exec` tool.
pub fn shell_exec(root: &Path) -> Tool {
    let root = root.to_path_buf();
    Tool {
        name: "shell.exec".to_string(),
        version: "v1".to_string(),
        permissions: PermissionMeta::allowed("exec"),
        schema: ToolSchema {
            input: Some(object_schema(json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "args": {"type": "array", "items": {"type": "string"}},
                    "working_dir": {"type": "string"}
                },
                "required": ["command"]
            }))),
            output: Some(object_schema(json!({
                "type": "object",
                "properties": {
                    "stdout": {"type": "string"},
                    "stderr": {"type": "string"},
                    "exit_code": {"type": "integer"}
                }
            }))),
        },
        handler: Some(handler(move |params: Option<Box<RawValue>>| {
            let root = root.clone();
            async move {
                let payload: ShellExecParams = parse_params(params.as_deref())?;
                if payload.command.is_empty() {
                    return Err(ErrorDetail::invalid_params("command is required"));
                }
                let dir = workspace::resolve_dir(&root, &payload.working_dir)
                    .map_err(|e| workspace_failure(&e))?;
                let result =
                    exec::run(&payload.command, &payload.args, &dir, exec::DEFAULT_TIMEOUT)
                        .await
                        .map_err(|e| ErrorDetail::tool_error(e.to_string()))?;
                serde_json::to_value(result)
                    .map_err(|e| ErrorDetail::tool_error(e.to_string()))
            }
        })),
    }
}

/// The `code.exec` tool.
pub fn code_exec(root: &Path) -> Tool {
    let root = root.to_path_buf();
    Tool {
        name: "code.exec".to_string(),
        version: "v1".to_string(),
        permissions: PermissionMeta::allowed("exec"),
        schema: ToolSchema {
            input: Some(object_schema(json!({
                "type": "object",
                "properties": {
                    "runtime": {"type": "string", "enum": ["python", "node"]},
                    "args": {"type": "array", "items": {"type": "string"}},
                    "working_dir": {"type": "string"}
                },
                "required": ["runtime"]
            }))),
            output: None,
        },
        handler: Some(handler(move |params: Option<Box<RawValue>>| {
            let root = root.clone();
            async move {
                let payload: CodeExecParams = parse_params(params.as_deref())?;
                if payload.runtime.is_empty() {
                    return Err(ErrorDetail::invalid_params("runtime is required"));
                }
                let dir = workspace::resolve_dir(&root, &payload.working_dir)
                    .map_err(|e| workspace_failure(&e))?;
                let result = exec::run_runtime(
                    &payload.runtime,
                    &payload.args,
                    &dir,
                    exec::DEFAULT_TIMEOUT,
                )
                .await
                .map_err(|e| ErrorDetail::tool_error(e.to_string()))?;
                serde_json::to_value(result)
                    .map_err(|e| ErrorDetail::tool_error(e.to_string()))
            }
        })),
    }
}

/// Builds the startup registry with every local tool.
#[must_use]
pub fn build_registry(workspace_root: &Path) -> Registry {
    let registry = Registry::new();
    registry.register(file_read(workspace_root));
    registry.register(file_write(workspace_root));
    registry.register(file_list(workspace_root));
    registry.register(file_search(workspace_root));
    registry.register(file_replace(workspace_root));
    registry.register(shell_exec(workspace_root));
    registry.register(code_exec(workspace_root));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> Option<Box<RawValue>> {
        Some(RawValue::from_string(json.to_string()).expect("raw value"))
    }

    async fn call(tool: &Tool, params: Option<Box<RawValue>>) -> Result<Value, ErrorDetail> {
        let handler = tool.handler.as_ref().expect("handler");
        handler(params).await
    }

    #[tokio::test]
    async fn file_write_then_read_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();

        let written = call(
            &file_write(&root),
            raw(r#"{"path":"notes.txt","content":"hello sandbox"}"#),
        )
        .await
        .expect("write should succeed");
        assert!(written["path"]
            .as_str()
            .expect("path")
            .ends_with("notes.txt"));

        let read = call(&file_read(&root), raw(r#"{"path":"notes.txt"}"#))
            .await
            .expect("read should succeed");
        assert_eq!(read["content"], "hello sandbox");
    }

    #[tokio::test]
    async fn file_read_missing_params_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = call(&file_read(&dir.path().to_path_buf()), None)
            .await
            .expect_err("missing params should fail");
        assert_eq!(err.kind, "invalid_params");
    }

    #[tokio::test]
    async fn file_read_escape_is_invalid_params() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = call(
            &file_read(&dir.path().to_path_buf()),
            raw(r#"{"path":"../outside.txt"}"#),
        )
        .await
        .expect_err("escape should fail");
        assert_eq!(err.kind, "invalid_params");
        assert_eq!(err.message, "path must be within workspace");
    }

    #[tokio::test]
    async fn file_read_missing_file_is_tool_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = call(
            &file_read(&dir.path().to_path_buf()),
            raw(r#"{"path":"absent.txt"}"#),
        )
        .await
        .expect_err("missing file should fail");
        assert_eq!(err.kind, "tool_error");
    }

    #[tokio::test]
    async fn file_list_defaults_to_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        call(
            &file_write(&root),
            raw(r#"{"path":"present.txt","content":""}"#),
        )
        .await
        .expect("write");

        let listed = call(&file_list(&root), None).await.expect("list");
        assert_eq!(listed["entries"], json!(["present.txt"]));
    }

    #[tokio::test]
    async fn file_search_and_replace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        call(
            &file_write(&root),
            raw(r#"{"path":"data.txt","content":"one match\nno hit\nmatch two"}"#),
        )
        .await
        .expect("write");

        let found = call(
            &file_search(&root),
            raw(r#"{"path":"data.txt","query":"match"}"#),
        )
        .await
        .expect("search");
        assert_eq!(found["matches"], json!(["one match", "match two"]));

        let replaced = call(
            &file_replace(&root),
            raw(r#"{"path":"data.txt","search":"match","replace":"hit"}"#),
        )
        .await
        .expect("replace");
        assert_eq!(replaced["count"], 2);

        let empty_search = call(
            &file_replace(&root),
            raw(r#"{"path":"data.txt","search":"","replace":"x"}"#),
        )
        .await
        .expect_err("empty search should fail");
        assert_eq!(empty_search.kind, "invalid_params");
    }

    #[tokio::test]
    async fn shell_exec_requires_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = call(&shell_exec(&dir.path().to_path_buf()), raw("{}"))
            .await
            .expect_err("empty command should fail");
        assert_eq!(err.message, "command is required");
    }

    #[tokio::test]
    async fn shell_exec_captures_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = call(
            &shell_exec(&dir.path().to_path_buf()),
            raw(r#"{"command":"sh","args":["-c","echo out; exit 2"]}"#),
        )
        .await
        .expect("exec should produce a result");
        assert_eq!(result["exit_code"], 2);
        assert_eq!(result["stdout"].as_str().expect("stdout").trim(), "out");
    }

    #[tokio::test]
    async fn code_exec_rejects_unknown_runtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = call(
            &code_exec(&dir.path().to_path_buf()),
            raw(r#"{"runtime":"ruby"}"#),
        )
        .await
        .expect_err("unknown runtime should fail");
        assert_eq!(err.kind, "tool_error");
        assert_eq!(err.message, "unsupported runtime");
    }

    #[tokio::test]
    async fn registry_contains_every_local_tool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = build_registry(dir.path());
        let names: Vec<String> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "code.exec",
                "file.list",
                "file.read",
                "file.replace",
                "file.search",
                "file.write",
                "shell.exec"
            ]
        );
    }
}
