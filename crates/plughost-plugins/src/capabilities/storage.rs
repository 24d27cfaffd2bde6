//! Scoped key-value storage
//!
//! One JSON object file per plugin id under the storage directory. A plugin
//! only ever receives the handle for its own file.

use plughost_core::{Error, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Read a JSON object file; a missing file reads as empty
pub(crate) async fn read_object(path: &Path) -> Result<Map<String, Value>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::storage(format!("{} does not hold a JSON object", path.display()))),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
        Err(e) => Err(e.into()),
    }
}

/// Write a JSON object file (pretty-printed), creating parent directories
pub(crate) async fn write_object(path: &Path, data: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(data)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Storage handle scoped to one plugin
#[derive(Clone)]
pub struct PluginStorage {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl PluginStorage {
    pub(crate) fn new(storage_dir: &Path, plugin_id: &str) -> Self {
        Self {
            path: storage_dir.join(format!("{}.json", plugin_id)),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        let data = read_object(&self.path).await?;
        Ok(data.get(key).filter(|v| !v.is_null()).cloned())
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = read_object(&self.path).await?;
        data.insert(key.to_string(), value);
        write_object(&self.path, &data).await
    }

    /// Remove a key; returns whether it existed
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut data = read_object(&self.path).await?;
        let existed = data.remove(key).is_some();
        write_object(&self.path, &data).await?;
        Ok(existed)
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        write_object(&self.path, &Map::new()).await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(read_object(&self.path).await?.keys().cloned().collect())
    }
}
