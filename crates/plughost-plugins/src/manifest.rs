//! Plugin manifest (`plugin.json`)

use indexmap::IndexMap;
use plughost_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Manifest file name inside a plugin directory
pub const MANIFEST_FILE: &str = "plugin.json";

/// Plugin metadata as declared in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,
    /// Three-component version, "x.y.z"
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    /// Entry point reference
    #[serde(default)]
    pub main: String,
    /// Capability tags
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<PluginDependencies>,
}

/// Declared dependencies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginDependencies {
    /// Dependency plugin ID to version range, in declaration order
    #[serde(default)]
    pub plugins: IndexMap<String, String>,
}

impl PluginMetadata {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            version: version.to_string(),
            description: String::new(),
            author: String::new(),
            main: String::new(),
            permissions: BTreeSet::new(),
            dependencies: None,
        }
    }

    pub fn with_main(mut self, main: &str) -> Self {
        self.main = main.to_string();
        self
    }

    pub fn with_dependency(mut self, id: &str, range: &str) -> Self {
        self.dependencies
            .get_or_insert_with(PluginDependencies::default)
            .plugins
            .insert(id.to_string(), range.to_string());
        self
    }

    pub fn with_permission(mut self, tag: &str) -> Self {
        self.permissions.insert(tag.to_string());
        self
    }

    /// Declared dependencies in declaration order
    pub fn dependency_ranges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dependencies
            .iter()
            .flat_map(|deps| deps.plugins.iter())
            .map(|(id, range)| (id.as_str(), range.as_str()))
    }

    pub fn has_permission(&self, tag: &str) -> bool {
        self.permissions.contains(tag)
    }
}

/// Check that a plugin ID is safe to use as a single path component
pub fn validate_plugin_id(id: &str) -> Result<()> {
    let valid = !id.trim().is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
        && !id.contains("..");
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidPluginId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_manifest() {
        let meta: PluginMetadata = serde_json::from_value(json!({
            "id": "docker-tools",
            "name": "Docker Tools",
            "version": "1.2.0",
            "description": "Container helpers",
            "author": "ops",
            "main": "builtin:echo",
            "permissions": ["network", "storage"],
            "dependencies": {"plugins": {"core-ui": "^1.0.0", "auth": ">=2.1.0"}}
        }))
        .unwrap();

        assert!(meta.has_permission("network"));
        assert!(!meta.has_permission("shell"));
        let deps: Vec<_> = meta.dependency_ranges().collect();
        assert_eq!(deps, vec![("core-ui", "^1.0.0"), ("auth", ">=2.1.0")]);
    }

    #[test]
    fn test_minimal_manifest() {
        let meta: PluginMetadata =
            serde_json::from_value(json!({"id": "a", "name": "A", "version": "0.1.0"})).unwrap();
        assert_eq!(meta.dependency_ranges().count(), 0);
        assert!(meta.main.is_empty());
    }

    #[test]
    fn test_validate_plugin_id() {
        assert!(validate_plugin_id("weather-plugin").is_ok());
        assert!(validate_plugin_id("com.example.tool").is_ok());
        for bad in ["", " ", "..", "../etc", "a/b", "a\\b"] {
            assert!(matches!(validate_plugin_id(bad), Err(Error::InvalidPluginId(_))), "{:?}", bad);
        }
    }
}
