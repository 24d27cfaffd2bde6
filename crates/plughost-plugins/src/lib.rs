//! plughost-plugins: plugin lifecycle, dependency resolution and capabilities
//!
//! Features:
//! - Manifest parsing and plugin ID validation
//! - Dependency resolver with load ordering, cycle detection and version ranges
//! - Lifecycle loader with failure isolation and unconditional teardown
//! - Per-plugin capability context (storage, secure storage, HTTP, events, registrations)
//! - Marketplace coordination over an explicit channel

pub mod builtin;
pub mod capabilities;
pub mod context;
pub mod loader;
pub mod manifest;
pub mod plugin;
pub mod resolver;
pub mod system;

pub use capabilities::Capabilities;
pub use context::PluginContext;
pub use loader::{InitReport, LoadedPlugin, PluginEvent, PluginLoader, PluginSummary};
pub use manifest::{PluginDependencies, PluginMetadata};
pub use plugin::{BoxedPlugin, EntryPointRegistry, Plugin, PluginFactory, PluginState};
pub use resolver::{DependencyResolver, ResolveResult};
pub use system::{MarketEvent, PluginSystem};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::context::PluginContext;
    pub use super::loader::PluginLoader;
    pub use super::manifest::PluginMetadata;
    pub use super::plugin::{BoxedPlugin, Plugin, PluginState};
    pub use super::resolver::DependencyResolver;
    pub use super::system::{MarketEvent, PluginSystem};
}
