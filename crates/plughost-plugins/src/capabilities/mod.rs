//! Host capabilities handed to plugins
//!
//! [`Capabilities`] owns the shared services (storage locations, encryption,
//! HTTP, host surfaces, topic events, contributions and the engine) and cuts
//! a scoped [`PluginContext`] out of them for each plugin. Releasing a
//! plugin withdraws everything it registered through that context.

pub mod contributions;
pub mod events;
pub mod host;
pub mod http;
pub mod logger;
pub mod registrations;
pub mod secure;
pub mod storage;

use plughost_core::{HostConfig, Result};
use plughost_workflows::WorkflowEngine;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::PluginContext;
use crate::manifest::PluginMetadata;
use contributions::Contributions;
use events::{EventHub, ScopedEvents};
use host::{LoggingUi, NoRemoteHost, PluginUi, RemoteFileApi, ServerApi, UiApi};
use http::{HttpTransport, PluginHttp, ReqwestTransport};
use logger::PluginLogger;
use registrations::{AgentApi, RegistrationLedger, ToolsApi};
use secure::{AesGcmEncryptor, Encryptor, NoEncryption, SecureStorage};
use storage::PluginStorage;

/// Shared capability services
pub struct Capabilities {
    storage_dir: PathBuf,
    engine: Arc<WorkflowEngine>,
    encryptor: Arc<dyn Encryptor>,
    http: Arc<dyn HttpTransport>,
    ui: Arc<dyn UiApi>,
    server: Arc<dyn ServerApi>,
    files: Arc<dyn RemoteFileApi>,
    events: Arc<EventHub>,
    contributions: Arc<Contributions>,
    ledger: Arc<RegistrationLedger>,
}

impl Capabilities {
    /// Build the default services from host configuration
    pub fn new(config: &HostConfig, engine: Arc<WorkflowEngine>) -> Result<Self> {
        let encryptor: Arc<dyn Encryptor> = match &config.secret_key {
            Some(secret) => Arc::new(AesGcmEncryptor::from_secret(secret)?),
            None => {
                info!("No secret key configured; secure storage will not encrypt");
                Arc::new(NoEncryption)
            }
        };
        let remote = Arc::new(NoRemoteHost);

        Ok(Self {
            storage_dir: config.storage_dir.clone(),
            engine,
            encryptor,
            http: Arc::new(ReqwestTransport::new(config)?),
            ui: Arc::new(LoggingUi),
            server: remote.clone(),
            files: remote,
            events: Arc::new(EventHub::new()),
            contributions: Arc::new(Contributions::new()),
            ledger: Arc::new(RegistrationLedger::new()),
        })
    }

    pub fn with_http(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.http = transport;
        self
    }

    pub fn with_ui(mut self, ui: Arc<dyn UiApi>) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_server(mut self, server: Arc<dyn ServerApi>) -> Self {
        self.server = server;
        self
    }

    pub fn with_files(mut self, files: Arc<dyn RemoteFileApi>) -> Self {
        self.files = files;
        self
    }

    pub fn with_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = encryptor;
        self
    }

    /// Create the storage directory
    pub async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        Ok(())
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn contributions(&self) -> &Arc<Contributions> {
        &self.contributions
    }

    pub fn ledger(&self) -> &Arc<RegistrationLedger> {
        &self.ledger
    }

    /// Build the scoped context for one plugin
    pub fn context_for(&self, metadata: &PluginMetadata, config: Value) -> PluginContext {
        let id = metadata.id.as_str();
        PluginContext {
            plugin_id: id.to_string(),
            metadata: metadata.clone(),
            config: tokio::sync::RwLock::new(config),
            storage: PluginStorage::new(&self.storage_dir, id),
            secure_storage: SecureStorage::new(&self.storage_dir, id, self.encryptor.clone()),
            http: PluginHttp::new(self.http.clone()),
            ui: PluginUi::new(id, self.ui.clone()),
            server: self.server.clone(),
            files: self.files.clone(),
            events: ScopedEvents::new(id, self.events.clone()),
            agent: AgentApi::new(id, self.engine.clone(), self.ledger.clone()),
            tools: ToolsApi::new(id, self.engine.clone(), self.ledger.clone()),
            menus: self.contributions.scoped_menus(id),
            routes: self.contributions.scoped_routes(id),
            commands: self.contributions.scoped_commands(id),
            logger: PluginLogger::new(id),
        }
    }

    /// Withdraw everything a plugin registered through its context
    pub async fn release(&self, plugin_id: &str) {
        let registrations = registrations::release(&self.ledger, &self.engine, plugin_id).await;
        let contributions = self.contributions.release(plugin_id).await;
        let subscriptions = self.events.release(plugin_id).await;
        debug!(
            plugin_id = %plugin_id,
            registrations,
            contributions,
            subscriptions,
            "Released plugin capabilities"
        );
    }
}
