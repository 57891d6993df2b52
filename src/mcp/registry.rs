//! The shared tool registry.
//!
//! One registry instance is created at startup and shared by every
//! transport and the remote-federation manager. Reads (lookup, catalog
//! listing) are concurrent; registration and removal take exclusive
//! access. The store holds at most a few hundred entries, so the catalog
//! is copied out under the read lock and normalised outside it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::mcp::protocol::ErrorDetail;

/// A JSON-schema-shaped mapping.
pub type JsonSchema = serde_json::Map<String, Value>;

/// Compound schema record attached to a tool descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Input schema, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<JsonSchema>,
    /// Output schema, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonSchema>,
}

impl ToolSchema {
    /// True when neither input nor output carries any fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input.as_ref().map_or(true, JsonSchema::is_empty)
            && self.output.as_ref().map_or(true, JsonSchema::is_empty)
    }
}

/// Permission metadata advertised with every tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionMeta {
    /// Whether callers may invoke the tool.
    #[serde(default)]
    pub allow: bool,
    /// Scope tag (`workspace`, `exec`, `network`, `external`, ...).
    #[serde(default)]
    pub scope: String,
    /// Optional reason shown when invocation is restricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PermissionMeta {
    /// An allow-all record for the given scope.
    #[must_use]
    pub fn allowed(scope: &str) -> Self {
        Self {
            allow: true,
            scope: scope.to_string(),
            reason: None,
        }
    }
}

/// A tool handler: raw argument bytes in, a value or a structured error
/// detail out. Absent params mean "no arguments were provided" and are
/// never conflated with JSON `null`.
pub type ToolHandler =
    Arc<dyn Fn(Option<Box<RawValue>>) -> BoxFuture<'static, Result<Value, ErrorDetail>> + Send + Sync>;

/// Wraps an async closure into a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Option<Box<RawValue>>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, ErrorDetail>> + Send + 'static,
{
    Arc::new(move |params| f(params).boxed())
}

/// A registered tool descriptor. Immutable once registered;
/// re-registering the same name replaces the prior entry atomically.
#[derive(Clone)]
pub struct Tool {
    /// Unique dotted or underscored identifier.
    pub name: String,
    /// Version string advertised in the catalog.
    pub version: String,
    /// Permission metadata.
    pub permissions: PermissionMeta,
    /// Input/output schema record.
    pub schema: ToolSchema,
    /// Handler capability; descriptors without one are listed but never
    /// dispatchable.
    pub handler: Option<ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("permissions", &self.permissions)
            .field("schema", &self.schema)
            .field("handler", &self.handler.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Wire form of a catalog entry, as returned by `tools/list`.
///
/// `inputSchema` is always populated (normalised); `outputSchema` only
/// when the descriptor declares one; `schema` echoes the raw compound
/// record for clients that want the legacy form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    #[serde(default)]
    pub name: String,
    /// Version string.
    #[serde(default)]
    pub version: String,
    /// Permission metadata.
    #[serde(default)]
    pub permissions: PermissionMeta,
    /// Legacy compound schema record.
    #[serde(default, skip_serializing_if = "ToolSchema::is_empty")]
    pub schema: ToolSchema,
    /// Normalised input schema.
    #[serde(rename = "inputSchema", default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<JsonSchema>,
    /// Output schema, when non-empty.
    #[serde(rename = "outputSchema", default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<JsonSchema>,
}

/// Result payload of `tools/list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// Catalog entries, sorted lexicographically by name.
    pub tools: Vec<ToolInfo>,
}

/// The `{"type":"object"}` schema substituted for tools that declare no
/// input schema.
#[must_use]
pub fn default_object_schema() -> JsonSchema {
    let mut schema = JsonSchema::new();
    schema.insert("type".to_string(), Value::String("object".to_string()));
    schema
}

fn normalised_input(input: Option<&JsonSchema>) -> JsonSchema {
    match input {
        Some(map) if !map.is_empty() => {
            let mut normalised = map.clone();
            if !normalised.contains_key("type") {
                normalised.insert("type".to_string(), Value::String("object".to_string()));
            }
            normalised
        }
        _ => default_object_schema(),
    }
}

/// Thread-safe mapping from tool name to descriptor.
#[derive(Default)]
pub struct Registry {
    tools: RwLock<HashMap<String, Tool>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a descriptor by name.
    pub fn register(&self, tool: Tool) {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        tools.insert(tool.name.clone(), tool);
    }

    /// Removes a descriptor by name; absent names are a no-op.
    pub fn unregister(&self, name: &str) {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        tools.remove(name);
    }

    /// Applies a batch of removals and insertions under one exclusive
    /// lock scope, so a concurrent list never observes a partial mix.
    pub fn apply(&self, register: Vec<Tool>, unregister: &[String]) {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        for name in unregister {
            tools.remove(name);
        }
        for tool in register {
            tools.insert(tool.name.clone(), tool);
        }
    }

    /// Looks up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Tool> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.get(name).cloned()
    }

    /// Produces the catalog, sorted lexicographically by name.
    #[must_use]
    pub fn list(&self) -> Vec<ToolInfo> {
        let snapshot: Vec<Tool> = {
            let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
            tools.values().cloned().collect()
        };

        let mut infos: Vec<ToolInfo> = snapshot
            .into_iter()
            .map(|tool| {
                let input_schema = normalised_input(tool.schema.input.as_ref());
                let output_schema = tool
                    .schema
                    .output
                    .clone()
                    .filter(|schema| !schema.is_empty());
                ToolInfo {
                    name: tool.name,
                    version: tool.version,
                    permissions: tool.permissions,
                    schema: tool.schema,
                    input_schema: Some(input_schema),
                    output_schema,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &str, version: &str) -> Tool {
        Tool {
            name: name.to_string(),
            version: version.to_string(),
            permissions: PermissionMeta::allowed("workspace"),
            schema: ToolSchema::default(),
            handler: None,
        }
    }

    fn schema_map(value: Value) -> JsonSchema {
        value.as_object().cloned().expect("schema literal")
    }

    #[test]
    fn register_get_unregister_round_trip() {
        let registry = Registry::new();
        registry.register(named("file.read", "v1"));

        let tool = registry.get("file.read").expect("tool should be present");
        assert_eq!(tool.version, "v1");

        registry.unregister("file.read");
        assert!(registry.get("file.read").is_none());
    }

    #[test]
    fn reregister_replaces_descriptor() {
        let registry = Registry::new();
        registry.register(named("file.read", "v1"));
        registry.register(named("file.read", "v2"));

        let infos = registry.list();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].version, "v2");
    }

    #[test]
    fn list_is_sorted_by_name() {
        let registry = Registry::new();
        registry.register(named("shell.exec", "v1"));
        registry.register(named("browser.navigate", "v1"));
        registry.register(named("file.read", "v1"));

        let names: Vec<String> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["browser.navigate", "file.read", "shell.exec"]);
    }

    #[test]
    fn empty_input_schema_normalises_to_object() {
        let registry = Registry::new();
        registry.register(named("file.read", "v1"));

        let infos = registry.list();
        let input = infos[0].input_schema.as_ref().expect("input schema");
        assert_eq!(input.get("type"), Some(&json!("object")));
        assert_eq!(input.len(), 1);
        assert!(infos[0].output_schema.is_none());
    }

    #[test]
    fn input_schema_with_fields_gains_type() {
        let registry = Registry::new();
        let mut tool = named("file.read", "v1");
        tool.schema.input = Some(schema_map(json!({
            "properties": {"path": {"type": "string"}}
        })));
        registry.register(tool);

        let infos = registry.list();
        let input = infos[0].input_schema.as_ref().expect("input schema");
        assert_eq!(input.get("type"), Some(&json!("object")));
        assert!(input.contains_key("properties"));
    }

    #[test]
    fn declared_type_is_preserved() {
        let registry = Registry::new();
        let mut tool = named("echo", "v1");
        tool.schema.input = Some(schema_map(json!({"type": "array"})));
        registry.register(tool);

        let input = registry.list()[0]
            .input_schema
            .clone()
            .expect("input schema");
        assert_eq!(input.get("type"), Some(&json!("array")));
    }

    #[test]
    fn output_schema_listed_only_when_non_empty() {
        let registry = Registry::new();
        let mut tool = named("file.read", "v1");
        tool.schema.output = Some(schema_map(json!({"type": "object"})));
        registry.register(tool);
        let mut bare = named("file.write", "v1");
        bare.schema.output = Some(JsonSchema::new());
        registry.register(bare);

        let infos = registry.list();
        assert!(infos[0].output_schema.is_some());
        assert!(infos[1].output_schema.is_none());
    }

    #[test]
    fn permission_metadata_survives_round_trip() {
        let registry = Registry::new();
        let mut tool = named("file.read", "v1");
        tool.permissions = PermissionMeta {
            allow: true,
            scope: "workspace".to_string(),
            reason: Some("readonly".to_string()),
        };
        registry.register(tool);

        let stored = registry.get("file.read").expect("tool");
        assert!(stored.permissions.allow);
        assert_eq!(stored.permissions.scope, "workspace");
        assert_eq!(stored.permissions.reason.as_deref(), Some("readonly"));
    }

    #[test]
    fn apply_batches_removals_and_insertions() {
        let registry = Registry::new();
        registry.register(named("ext.s1.a", "v1"));
        registry.register(named("local", "v1"));

        registry.apply(
            vec![named("ext.s1.b", "v1")],
            &["ext.s1.a".to_string()],
        );

        assert!(registry.get("ext.s1.a").is_none());
        assert!(registry.get("ext.s1.b").is_some());
        assert!(registry.get("local").is_some());
    }
}
