//! Plugin Lifecycle Loader
//!
//! Discovers plugin directories, reads manifests and configuration, builds a
//! scoped context per plugin and drives the lifecycle hooks:
//!
//! ```text
//! Unloaded ──load──► Loading ──on_load, on_enable──► Enabled ⇄ Disabled
//!     ▲                                                  │
//!     └──────────────── on_disable, on_unload ◄── unload ┘
//! ```
//!
//! Lifecycle transitions are serialized inside the loader. A plugin only
//! counts as loaded once both `on_load` and `on_enable` succeeded, and
//! unloading always removes it, whatever its teardown hooks report.

use chrono::{DateTime, Utc};
use plughost_core::{Error, EventBus, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::capabilities::Capabilities;
use crate::context::PluginContext;
use crate::manifest::{validate_plugin_id, PluginMetadata, MANIFEST_FILE};
use crate::plugin::{BoxedPlugin, EntryPointRegistry, PluginState};
use crate::resolver::{version, DependencyResolver};

/// Per-plugin configuration file
pub const CONFIG_FILE: &str = "config.json";

/// Marketplace index kept next to the plugin directories
const REGISTRY_FILE: &str = "registry.json";

/// A plugin that completed `on_load` and `on_enable`
pub struct LoadedPlugin {
    pub metadata: PluginMetadata,
    pub context: Arc<PluginContext>,
    instance: Mutex<BoxedPlugin>,
    enabled: AtomicBool,
    sequence: u64,
    loaded_at: DateTime<Utc>,
}

impl LoadedPlugin {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PluginState {
        if self.is_enabled() {
            PluginState::Enabled
        } else {
            PluginState::Disabled
        }
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    fn summary(&self) -> PluginSummary {
        PluginSummary {
            id: self.metadata.id.clone(),
            name: self.metadata.name.clone(),
            version: self.metadata.version.clone(),
            state: self.state(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Listing entry for a loaded plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub state: PluginState,
    pub loaded_at: DateTime<Utc>,
}

/// Lifecycle notifications, delivered in subscription order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PluginEvent {
    Loaded { plugin_id: String },
    LoadFailed { plugin_id: String, error: String },
    Unloaded { plugin_id: String },
    Enabled { plugin_id: String },
    Disabled { plugin_id: String },
    ConfigChanged { plugin_id: String },
}

/// Outcome of [`PluginLoader::initialize`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitReport {
    /// Loaded ids, in load order
    pub loaded: Vec<String>,
    /// Candidates that failed, with the error message
    pub failed: Vec<(String, String)>,
}

/// Plugin Lifecycle Loader
pub struct PluginLoader {
    plugins_dir: PathBuf,
    enforce_dependencies: bool,
    capabilities: Arc<Capabilities>,
    resolver: Arc<RwLock<DependencyResolver>>,
    entry_points: Arc<EntryPointRegistry>,
    loaded: RwLock<HashMap<String, Arc<LoadedPlugin>>>,
    loading: RwLock<HashSet<String>>,
    lifecycle: Mutex<()>,
    sequence: AtomicU64,
    events: EventBus<PluginEvent>,
}

impl PluginLoader {
    pub fn new(
        plugins_dir: impl Into<PathBuf>,
        capabilities: Arc<Capabilities>,
        entry_points: Arc<EntryPointRegistry>,
    ) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            enforce_dependencies: false,
            capabilities,
            resolver: Arc::new(RwLock::new(DependencyResolver::new())),
            entry_points,
            loaded: RwLock::new(HashMap::new()),
            loading: RwLock::new(HashSet::new()),
            lifecycle: Mutex::new(()),
            sequence: AtomicU64::new(0),
            events: EventBus::new(),
        }
    }

    /// Refuse loads whose declared dependencies are not loaded and compatible
    pub fn with_enforce_dependencies(mut self, enforce: bool) -> Self {
        self.enforce_dependencies = enforce;
        self
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn resolver(&self) -> &Arc<RwLock<DependencyResolver>> {
        &self.resolver
    }

    pub fn entry_points(&self) -> &Arc<EntryPointRegistry> {
        &self.entry_points
    }

    pub fn capabilities(&self) -> &Arc<Capabilities> {
        &self.capabilities
    }

    pub fn events(&self) -> &EventBus<PluginEvent> {
        &self.events
    }

    fn plugin_dir(&self, id: &str) -> PathBuf {
        self.plugins_dir.join(id)
    }

    /// Installed plugin ids (one directory each), sorted
    pub async fn discover(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.plugins_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == REGISTRY_FILE {
                continue;
            }
            match validate_plugin_id(&name) {
                Ok(()) => ids.push(name),
                Err(e) => warn!(dir = %name, "Skipping plugin directory: {}", e),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Read `plugin.json` for `id`.
    ///
    /// The directory name is authoritative; a manifest declaring another ID
    /// is corrected with a warning.
    pub async fn read_manifest(&self, id: &str) -> Result<PluginMetadata> {
        validate_plugin_id(id)?;
        let path = self.plugin_dir(id).join(MANIFEST_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ManifestMissing(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut metadata: PluginMetadata = serde_json::from_slice(&bytes)?;
        if metadata.id != id {
            warn!(plugin_id = %id, declared = %metadata.id, "Manifest ID does not match directory");
            metadata.id = id.to_string();
        }
        Ok(metadata)
    }

    /// Read the persisted configuration, defaulting to `{}`
    pub async fn load_config(&self, id: &str) -> Value {
        let path = self.plugin_dir(id).join(CONFIG_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(plugin_id = %id, "Unreadable plugin config, using defaults: {}", e);
                json!({})
            }),
            Err(_) => json!({}),
        }
    }

    /// Register every readable manifest with the resolver; returns all candidates
    pub async fn scan(&self) -> Result<Vec<String>> {
        let candidates = self.discover().await?;
        let mut resolver = self.resolver.write().await;
        for id in &candidates {
            match self.read_manifest(id).await {
                Ok(metadata) => resolver.register_plugin(metadata),
                Err(e) => warn!(plugin_id = %id, "Cannot read manifest: {}", e),
            }
        }
        Ok(candidates)
    }

    /// Load every discovered plugin, dependencies first.
    ///
    /// A failing candidate is logged and recorded in the report; the
    /// remaining candidates are still attempted.
    pub async fn initialize(&self) -> Result<InitReport> {
        self.capabilities.initialize().await?;
        tokio::fs::create_dir_all(&self.plugins_dir).await?;

        let candidates = self.scan().await?;
        let order = self.load_order(&candidates).await;
        info!(candidates = candidates.len(), "Initializing plugins");

        let mut report = InitReport::default();
        for id in order {
            match self.load_plugin(&id).await {
                Ok(()) => report.loaded.push(id),
                Err(e) => {
                    error!(plugin_id = %id, "Failed to load plugin: {}", e);
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Plugin initialization complete"
        );
        Ok(report)
    }

    /// Merge resolver orders for all candidates; first appearance wins and
    /// anything the resolver could not place goes last
    async fn load_order(&self, candidates: &[String]) -> Vec<String> {
        let wanted: HashSet<&str> = candidates.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(candidates.len());

        let resolver = self.resolver.read().await;
        for id in candidates {
            if resolver.get(id).is_none() {
                continue;
            }
            let result = resolver.resolve(id);
            for message in &result.errors {
                warn!(plugin_id = %id, "Dependency resolution: {}", message);
            }
            for resolved in result.resolved {
                if wanted.contains(resolved.as_str()) && seen.insert(resolved.clone()) {
                    order.push(resolved);
                }
            }
        }
        for id in candidates {
            if seen.insert(id.clone()) {
                order.push(id.clone());
            }
        }
        order
    }

    /// Load a plugin. A no-op if it is already loaded.
    pub async fn load_plugin(&self, id: &str) -> Result<()> {
        validate_plugin_id(id)?;
        let _guard = self.lifecycle.lock().await;

        if self.loaded.read().await.contains_key(id) {
            debug!(plugin_id = %id, "Plugin already loaded");
            return Ok(());
        }

        self.loading.write().await.insert(id.to_string());
        let result = self.instantiate(id).await;
        self.loading.write().await.remove(id);

        match result {
            Ok(plugin) => {
                info!(plugin_id = %id, version = %plugin.metadata.version, "Plugin loaded");
                self.loaded.write().await.insert(id.to_string(), plugin);
                self.events
                    .emit(&PluginEvent::Loaded {
                        plugin_id: id.to_string(),
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                self.events
                    .emit(&PluginEvent::LoadFailed {
                        plugin_id: id.to_string(),
                        error: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn instantiate(&self, id: &str) -> Result<Arc<LoadedPlugin>> {
        let metadata = self.read_manifest(id).await?;
        self.resolver.write().await.register_plugin(metadata.clone());
        if self.enforce_dependencies {
            self.check_dependencies(&metadata).await?;
        }

        let config = self.load_config(id).await;
        let context = Arc::new(self.capabilities.context_for(&metadata, config));
        let factory = self.entry_points.get(&metadata.main).await?;
        let mut instance = factory
            .create(Arc::clone(&context))
            .map_err(|e| Error::internal(format!("Failed to create plugin {}: {:#}", id, e)))?;

        if let Err(e) = instance.on_load().await {
            self.capabilities.release(id).await;
            return Err(Error::hook_fault(id, "on_load", format!("{:#}", e)));
        }
        if let Err(e) = instance.on_enable().await {
            self.capabilities.release(id).await;
            return Err(Error::hook_fault(id, "on_enable", format!("{:#}", e)));
        }

        Ok(Arc::new(LoadedPlugin {
            metadata,
            context,
            instance: Mutex::new(instance),
            enabled: AtomicBool::new(true),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            loaded_at: Utc::now(),
        }))
    }

    async fn check_dependencies(&self, metadata: &PluginMetadata) -> Result<()> {
        let loaded = self.loaded.read().await;
        for (dep_id, range) in metadata.dependency_ranges() {
            let dep = loaded
                .get(dep_id)
                .ok_or_else(|| Error::DependencyNotFound(dep_id.to_string()))?;
            if !version::satisfies(&dep.metadata.version, range) {
                return Err(Error::VersionMismatch {
                    plugin: dep_id.to_string(),
                    required: range.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Unload a plugin. A no-op if it is not loaded.
    ///
    /// Both teardown hooks run and the plugin is removed even if one of them
    /// fails; the first fault is returned afterwards.
    pub async fn unload_plugin(&self, id: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let Some(plugin) = self.loaded.read().await.get(id).cloned() else {
            debug!(plugin_id = %id, "Plugin not loaded; nothing to unload");
            return Ok(());
        };

        let mut fault = None;
        {
            let mut instance = plugin.instance.lock().await;
            if plugin.is_enabled() {
                if let Err(e) = instance.on_disable().await {
                    warn!(plugin_id = %id, "on_disable failed: {:#}", e);
                    fault.get_or_insert(Error::hook_fault(id, "on_disable", format!("{:#}", e)));
                }
            }
            if let Err(e) = instance.on_unload().await {
                warn!(plugin_id = %id, "on_unload failed: {:#}", e);
                fault.get_or_insert(Error::hook_fault(id, "on_unload", format!("{:#}", e)));
            }
        }

        self.loaded.write().await.remove(id);
        self.capabilities.release(id).await;
        info!(plugin_id = %id, "Plugin unloaded");
        self.events
            .emit(&PluginEvent::Unloaded {
                plugin_id: id.to_string(),
            })
            .await;

        match fault {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Unload then load; a failed load leaves the plugin unloaded
    pub async fn reload_plugin(&self, id: &str) -> Result<()> {
        self.unload_plugin(id).await?;
        self.load_plugin(id).await
    }

    /// Persist configuration and notify the plugin if it is loaded
    pub async fn save_config(&self, id: &str, config: Value) -> Result<()> {
        validate_plugin_id(id)?;
        let _guard = self.lifecycle.lock().await;

        let dir = self.plugin_dir(id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(CONFIG_FILE), serde_json::to_vec_pretty(&config)?).await?;
        debug!(plugin_id = %id, "Saved plugin config");

        let Some(plugin) = self.loaded.read().await.get(id).cloned() else {
            return Ok(());
        };
        plugin.context.set_config(config.clone()).await;
        plugin
            .instance
            .lock()
            .await
            .on_config_change(&config)
            .await
            .map_err(|e| Error::hook_fault(id, "on_config_change", format!("{:#}", e)))?;

        self.events
            .emit(&PluginEvent::ConfigChanged {
                plugin_id: id.to_string(),
            })
            .await;
        Ok(())
    }

    /// Run `on_enable` on a disabled plugin
    pub async fn enable_plugin(&self, id: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let plugin = self.require(id).await?;
        if plugin.is_enabled() {
            return Ok(());
        }
        plugin
            .instance
            .lock()
            .await
            .on_enable()
            .await
            .map_err(|e| Error::hook_fault(id, "on_enable", format!("{:#}", e)))?;
        plugin.enabled.store(true, Ordering::SeqCst);
        info!(plugin_id = %id, "Plugin enabled");
        self.events
            .emit(&PluginEvent::Enabled {
                plugin_id: id.to_string(),
            })
            .await;
        Ok(())
    }

    /// Run `on_disable` on an enabled plugin; it stays loaded
    pub async fn disable_plugin(&self, id: &str) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let plugin = self.require(id).await?;
        if !plugin.is_enabled() {
            return Ok(());
        }
        plugin
            .instance
            .lock()
            .await
            .on_disable()
            .await
            .map_err(|e| Error::hook_fault(id, "on_disable", format!("{:#}", e)))?;
        plugin.enabled.store(false, Ordering::SeqCst);
        info!(plugin_id = %id, "Plugin disabled");
        self.events
            .emit(&PluginEvent::Disabled {
                plugin_id: id.to_string(),
            })
            .await;
        Ok(())
    }

    async fn require(&self, id: &str) -> Result<Arc<LoadedPlugin>> {
        self.get_plugin(id)
            .await
            .ok_or_else(|| Error::NotLoaded(id.to_string()))
    }

    pub async fn state(&self, id: &str) -> PluginState {
        if self.loading.read().await.contains(id) {
            return PluginState::Loading;
        }
        self.loaded
            .read()
            .await
            .get(id)
            .map_or(PluginState::Unloaded, |p| p.state())
    }

    pub async fn get_plugin(&self, id: &str) -> Option<Arc<LoadedPlugin>> {
        self.loaded.read().await.get(id).cloned()
    }

    pub async fn is_loaded(&self, id: &str) -> bool {
        self.loaded.read().await.contains_key(id)
    }

    /// Loaded plugins in load order
    pub async fn loaded_plugins(&self) -> Vec<PluginSummary> {
        let loaded = self.loaded.read().await;
        let mut plugins: Vec<&Arc<LoadedPlugin>> = loaded.values().collect();
        plugins.sort_by_key(|p| p.sequence);
        plugins.iter().map(|p| p.summary()).collect()
    }

    /// Unload everything, most recently loaded first
    pub async fn unload_all(&self) {
        let ids: Vec<String> = self
            .loaded_plugins()
            .await
            .into_iter()
            .rev()
            .map(|p| p.id)
            .collect();
        for id in ids {
            if let Err(e) = self.unload_plugin(&id).await {
                warn!(plugin_id = %id, "Error during unload: {}", e);
            }
        }
    }
}
