//! Federation manager: durable upstream configuration plus registry
//! materialisation.
//!
//! The manager owns two pieces of state under one mutex: the configured
//! server map (persisted to disk on every mutation) and, per server,
//! the set of federated tool names currently installed in the registry.
//! The mutex is never held across a network call: sync snapshots the
//! configuration, fetches catalogs unlocked, and applies each server's
//! diff to the registry (which has its own lock) as one batch.
//!
//! A failed catalog fetch leaves that server's previous registration
//! untouched; other servers sync independently. Sync errors are logged,
//! never surfaced as protocol errors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::mcp::protocol::ErrorDetail;
use crate::mcp::registry::{PermissionMeta, Registry, Tool, ToolHandler, ToolInfo, ToolSchema};
use crate::remote::client::{HttpRemoteClient, RemoteToolsApi};
use crate::remote::config::{ConfigFile, ServerConfig};
use crate::remote::filter::ToolFilter;

/// Prefix under which federated tools are registered.
const FEDERATED_PREFIX: &str = "ext";

#[derive(Default)]
struct ManagerState {
    servers: BTreeMap<String, ServerConfig>,
    installed: HashMap<String, BTreeSet<String>>,
}

/// Durable upstream-server store and registry synchroniser.
pub struct RemoteManager {
    path: PathBuf,
    client: Arc<dyn RemoteToolsApi>,
    state: Mutex<ManagerState>,
}

impl RemoteManager {
    /// Creates a manager over the default HTTP client, loading any
    /// existing state file.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when an existing state file cannot be
    /// read or parsed. A missing file is an empty configuration.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_client(path, Arc::new(HttpRemoteClient::new()))
    }

    /// Creates a manager with an injected remote client.
    ///
    /// # Errors
    ///
    /// Same conditions as [`RemoteManager::new`].
    pub fn with_client(
        path: impl Into<PathBuf>,
        client: Arc<dyn RemoteToolsApi>,
    ) -> Result<Self, StoreError> {
        let manager = Self {
            path: path.into(),
            client,
            state: Mutex::new(ManagerState::default()),
        };
        manager.load()?;
        Ok(manager)
    }

    /// Lists the configured servers, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<ServerConfig> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.servers.values().cloned().collect()
    }

    /// Looks up one server by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ServerConfig> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.servers.get(name).cloned()
    }

    /// Inserts or replaces a server configuration and persists.
    ///
    /// Does not sync; callers invoke [`RemoteManager::sync_registry`]
    /// explicitly.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] for an empty name or URL, or when the
    /// state file cannot be written.
    pub fn upsert(&self, mut config: ServerConfig) -> Result<(), StoreError> {
        config.name = config.name.trim().to_string();
        config.url = config.url.trim().to_string();
        if config.name.is_empty() {
            return Err(StoreError::NameRequired);
        }
        if config.url.is_empty() {
            return Err(StoreError::UrlRequired);
        }
        if config.transport.is_empty() {
            config.transport = "http".to_string();
        }

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.servers.insert(config.name.clone(), config);
        }
        self.save()
    }

    /// Removes a server configuration and persists. The federated tools
    /// it contributed are unregistered on the next sync.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the state file cannot be written.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.servers.remove(name);
        }
        self.save()
    }

    /// Synchronises the registry with every configured server.
    ///
    /// For each server the upstream catalog is fetched and filtered,
    /// descriptors are built under the `ext.<server>.<tool>` prefix,
    /// and the name-set diff against the previous sync drives one
    /// batched register/unregister call. A fetch failure leaves that
    /// server's registration unchanged. Servers no longer configured
    /// have their leftover registrations swept.
    pub async fn sync_registry(&self, registry: &Registry) {
        let servers: Vec<ServerConfig> = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.servers.values().cloned().collect()
        };

        for config in &servers {
            let catalog = match self.client.tools_list(config).await {
                Ok(catalog) => catalog,
                Err(err) => {
                    warn!(
                        server = %config.name,
                        error = %err,
                        "tool list fetch failed; keeping previous registration"
                    );
                    continue;
                }
            };

            let filter = ToolFilter::new(config);
            let mut next: BTreeSet<String> = BTreeSet::new();
            let mut tools: Vec<Tool> = Vec::new();
            for info in catalog.tools {
                if info.name.is_empty() || !filter.allowed(&info.name) {
                    continue;
                }
                let registered = format!("{FEDERATED_PREFIX}.{}.{}", config.name, info.name);
                tools.push(Tool {
                    name: registered.clone(),
                    version: info.version.clone(),
                    permissions: PermissionMeta::allowed("external"),
                    schema: federated_schema(&info),
                    handler: Some(remote_handler(
                        Arc::clone(&self.client),
                        config.clone(),
                        info.name,
                    )),
                });
                next.insert(registered);
            }

            let prior = {
                let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                state
                    .installed
                    .get(&config.name)
                    .cloned()
                    .unwrap_or_default()
            };
            let removed: Vec<String> = prior.difference(&next).cloned().collect();
            debug!(
                server = %config.name,
                installed = next.len(),
                removed = removed.len(),
                "synchronised federated tools"
            );
            registry.apply(tools, &removed);

            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.installed.insert(config.name.clone(), next);
        }

        // Sweep registrations of servers removed from the configuration.
        let configured: BTreeSet<String> = servers.into_iter().map(|s| s.name).collect();
        let stale: Vec<(String, BTreeSet<String>)> = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let names: Vec<String> = state
                .installed
                .keys()
                .filter(|name| !configured.contains(*name))
                .cloned()
                .collect();
            names
                .into_iter()
                .filter_map(|name| state.installed.remove(&name).map(|set| (name, set)))
                .collect()
        };
        for (server, names) in stale {
            debug!(server = %server, removed = names.len(), "swept removed server");
            let removed: Vec<String> = names.into_iter().collect();
            registry.apply(Vec::new(), &removed);
        }
    }

    fn load(&self) -> Result<(), StoreError> {
        if !self.path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let file: ConfigFile =
            serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for server in file.servers {
            if server.name.trim().is_empty() {
                continue;
            }
            state.servers.insert(server.name.clone(), server);
        }
        Ok(())
    }

    /// Atomically rewrites the state file: serialise to a sibling
    /// temporary file, then rename over the target.
    fn save(&self) -> Result<(), StoreError> {
        let servers = self.list();
        let payload = serde_json::to_string_pretty(&ConfigFile { servers }).map_err(|source| {
            StoreError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;

        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        let tmp = temporary_path(&self.path);
        std::fs::write(&tmp, payload).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("state"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".tmp");
    path.with_file_name(name)
}

/// Prefers the catalog entry's discrete schema fields, falling back to
/// its compound record.
fn federated_schema(info: &ToolInfo) -> ToolSchema {
    if info.input_schema.is_some() || info.output_schema.is_some() {
        ToolSchema {
            input: info.input_schema.clone(),
            output: info.output_schema.clone(),
        }
    } else {
        info.schema.clone()
    }
}

/// Builds the forwarding handler for a federated tool. Upstream
/// failures map to tool errors; upstream protocol codes never leak
/// through.
fn remote_handler(
    client: Arc<dyn RemoteToolsApi>,
    config: ServerConfig,
    tool: String,
) -> ToolHandler {
    Arc::new(move |arguments| {
        let client = Arc::clone(&client);
        let config = config.clone();
        let tool = tool.clone();
        async move {
            client
                .tools_call(&config, &tool, arguments)
                .await
                .map_err(|err| ErrorDetail::tool_error(err.to_string()))
        }
        .boxed()
    })
}
