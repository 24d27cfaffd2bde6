//! Menus, routes and commands contributed by plugins
//!
//! Every contribution carries the ID of the plugin that made it. A plugin
//! can only remove its own entries; all of them go away on unload.

use futures::future::BoxFuture;
use plughost_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Anything registered under a unique key
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Menu entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub label: String,
    /// Where the entry is shown, e.g. "toolbar" or "context"
    pub location: String,
    /// Command run when the entry is picked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Keyed for MenuItem {
    fn key(&self) -> &str {
        &self.id
    }
}

/// UI route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub title: String,
    pub component: String,
}

impl Keyed for Route {
    fn key(&self) -> &str {
        &self.path
    }
}

pub type CommandHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Invocable command
#[derive(Clone)]
pub struct Command {
    pub id: String,
    pub title: String,
    handler: CommandHandler,
}

impl Command {
    pub fn new<F, Fut>(id: &str, title: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            handler: Arc::new(move |args| -> BoxFuture<'static, anyhow::Result<Value>> {
                Box::pin(handler(args))
            }),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("title", &self.title)
            .finish()
    }
}

impl Keyed for Command {
    fn key(&self) -> &str {
        &self.id
    }
}

struct Entry<T> {
    owner: String,
    item: T,
}

/// Owner-tagged registry of one contribution kind, in registration order
pub struct ContributionRegistry<T> {
    entries: RwLock<Vec<Entry<T>>>,
}

impl<T: Keyed + Clone + Send + Sync> ContributionRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register or replace the entry under `item.key()`; ownership moves to `owner`
    pub async fn register(&self, owner: &str, item: T) {
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.item.key() != item.key());
        entries.push(Entry {
            owner: owner.to_string(),
            item,
        });
    }

    /// Remove an entry if `owner` registered it
    pub async fn unregister(&self, owner: &str, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !(e.item.key() == key && e.owner == owner));
        entries.len() != before
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.item.key() == key).map(|e| e.item.clone())
    }

    pub async fn list(&self) -> Vec<T> {
        self.entries.read().await.iter().map(|e| e.item.clone()).collect()
    }

    /// Entries registered by `owner`
    pub async fn list_owned(&self, owner: &str) -> Vec<T> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.owner == owner)
            .map(|e| e.item.clone())
            .collect()
    }

    /// Drop everything `owner` registered
    pub async fn release(&self, owner: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.owner != owner);
        before - entries.len()
    }
}

impl<T: Keyed + Clone + Send + Sync> Default for ContributionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// All contribution kinds
#[derive(Default)]
pub struct Contributions {
    pub menus: ContributionRegistry<MenuItem>,
    pub routes: ContributionRegistry<Route>,
    pub commands: ContributionRegistry<Command>,
}

impl Contributions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a registered command
    pub async fn execute_command(&self, id: &str, args: Vec<Value>) -> Result<Value> {
        let command = self
            .commands
            .get(id)
            .await
            .ok_or_else(|| Error::UnknownCommand(id.to_string()))?;
        (command.handler)(args)
            .await
            .map_err(|e| Error::tool_execution(format!("command {}: {:#}", id, e)))
    }

    pub async fn release(&self, owner: &str) -> usize {
        self.menus.release(owner).await
            + self.routes.release(owner).await
            + self.commands.release(owner).await
    }
}

/// Registry handle scoped to one plugin
pub struct Scoped<T> {
    plugin_id: String,
    registry: Arc<Contributions>,
    select: fn(&Contributions) -> &ContributionRegistry<T>,
}

impl<T> Clone for Scoped<T> {
    fn clone(&self) -> Self {
        Self {
            plugin_id: self.plugin_id.clone(),
            registry: Arc::clone(&self.registry),
            select: self.select,
        }
    }
}

impl<T: Keyed + Clone + Send + Sync> Scoped<T> {
    fn registry(&self) -> &ContributionRegistry<T> {
        (self.select)(self.registry.as_ref())
    }

    pub async fn register(&self, item: T) {
        self.registry().register(&self.plugin_id, item).await
    }

    pub async fn unregister(&self, key: &str) -> bool {
        self.registry().unregister(&self.plugin_id, key).await
    }

    /// Every entry, from all plugins
    pub async fn list(&self) -> Vec<T> {
        self.registry().list().await
    }
}

impl Scoped<Command> {
    pub async fn execute(&self, id: &str, args: Vec<Value>) -> Result<Value> {
        self.registry.execute_command(id, args).await
    }
}

fn menus_of(c: &Contributions) -> &ContributionRegistry<MenuItem> {
    &c.menus
}

fn routes_of(c: &Contributions) -> &ContributionRegistry<Route> {
    &c.routes
}

fn commands_of(c: &Contributions) -> &ContributionRegistry<Command> {
    &c.commands
}

pub type ScopedMenus = Scoped<MenuItem>;
pub type ScopedRoutes = Scoped<Route>;
pub type ScopedCommands = Scoped<Command>;

impl Contributions {
    pub(crate) fn scoped_menus(self: &Arc<Self>, plugin_id: &str) -> ScopedMenus {
        Scoped {
            plugin_id: plugin_id.to_string(),
            registry: Arc::clone(self),
            select: menus_of,
        }
    }

    pub(crate) fn scoped_routes(self: &Arc<Self>, plugin_id: &str) -> ScopedRoutes {
        Scoped {
            plugin_id: plugin_id.to_string(),
            registry: Arc::clone(self),
            select: routes_of,
        }
    }

    pub(crate) fn scoped_commands(self: &Arc<Self>, plugin_id: &str) -> ScopedCommands {
        Scoped {
            plugin_id: plugin_id.to_string(),
            registry: Arc::clone(self),
            select: commands_of,
        }
    }
}
