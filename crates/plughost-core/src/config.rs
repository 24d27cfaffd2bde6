//! Host configuration
//!
//! [`HostConfig`] is built from `PLUGHOST_*` variables, which may be seeded
//! from an environment file (`PLUGHOST_ENV_FILE` or `/etc/plughost/environment`).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use plughost_core::config::{load_environment, HostConfig};
//!
//! load_environment();
//! let config = HostConfig::from_env();
//! println!("plugins live in {}", config.plugins_dir.display());
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment files tried by [`load_environment`], highest priority first
pub const ENV_FILE_PATHS: &[&str] = &["/etc/plughost/environment", "/etc/plughost.env", ".env"];

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "/var/lib/plughost";

/// Default timeout for outbound plugin HTTP requests
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Entries of an environment file, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    pub entries: Vec<(String, String)>,
}

impl EnvFile {
    /// Parse `KEY=VALUE` lines. Blank lines, `#` comments and lines without
    /// a key are ignored; one pair of matching quotes around a value is removed.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(parse_env_line)
            .collect();
        Self { entries }
    }

    /// Read and parse a file; `None` if it is absent or unreadable
    pub fn read(path: &Path) -> Option<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Some(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read environment file");
                None
            }
        }
    }

    /// Export entries into the process environment without overriding
    /// variables that are already set. Returns how many were exported.
    pub fn apply(&self) -> usize {
        let mut exported = 0;
        for (key, value) in &self.entries {
            if std::env::var_os(key).is_some() {
                debug!(key = %key, "Environment variable already set");
                continue;
            }
            std::env::set_var(key, value);
            exported += 1;
        }
        exported
    }
}

/// Load the first environment file found.
///
/// `PLUGHOST_ENV_FILE` is tried first, then [`ENV_FILE_PATHS`] in order.
/// Existing variables always win over file entries. Returns the path used.
pub fn load_environment() -> Option<PathBuf> {
    let candidates = std::env::var_os("PLUGHOST_ENV_FILE")
        .map(PathBuf::from)
        .into_iter()
        .chain(ENV_FILE_PATHS.iter().map(PathBuf::from));

    for path in candidates {
        if let Some(file) = EnvFile::read(&path) {
            let exported = file.apply();
            info!(
                path = %path.display(),
                exported,
                skipped = file.entries.len() - exported,
                "Loaded environment file"
            );
            return Some(path);
        }
    }

    debug!("No environment file found");
    None
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q)?.strip_suffix(*q))
        .unwrap_or(value);
    Some((key.to_string(), unquoted.to_string()))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_flag(key: &str) -> Option<bool> {
    env_opt(key).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Host-wide configuration shared by the loader and the capability services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Root data directory
    pub data_dir: PathBuf,
    /// One sub-directory per installed plugin, each holding `plugin.json`
    pub plugins_dir: PathBuf,
    /// Scoped and secure storage files
    pub storage_dir: PathBuf,
    /// Secret used to derive the secure-storage key; `None` disables encryption
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    /// Timeout for outbound plugin HTTP requests
    pub http_timeout_secs: u64,
    /// User-Agent header sent with plugin HTTP requests
    pub user_agent: String,
    /// Refuse to load a plugin whose declared dependencies are not loaded and compatible
    pub enforce_dependencies: bool,
}

impl HostConfig {
    /// Build a configuration rooted at `data_dir` with default sub-directories.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            plugins_dir: data_dir.join("plugins"),
            storage_dir: data_dir.join("plugin-storage"),
            data_dir,
            secret_key: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: default_user_agent(),
            enforce_dependencies: false,
        }
    }

    /// Build the configuration from `PLUGHOST_*` environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let data_dir = env_opt("PLUGHOST_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let mut config = Self::with_data_dir(data_dir);

        if let Some(dir) = env_opt("PLUGHOST_PLUGINS_DIR") {
            config.plugins_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_opt("PLUGHOST_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }
        config.secret_key = env_opt("PLUGHOST_SECRET_KEY");
        if let Some(secs) = env_opt("PLUGHOST_HTTP_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
            config.http_timeout_secs = secs;
        }
        if let Some(agent) = env_opt("PLUGHOST_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(enforce) = env_flag("PLUGHOST_ENFORCE_DEPENDENCIES") {
            config.enforce_dependencies = enforce;
        }
        config
    }

    /// Override the secure-storage secret
    pub fn with_secret_key(mut self, secret: impl Into<String>) -> Self {
        self.secret_key = Some(secret.into());
        self
    }

    /// Turn dependency enforcement on or off
    pub fn with_enforce_dependencies(mut self, enforce: bool) -> Self {
        self.enforce_dependencies = enforce;
        self
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::with_data_dir(DEFAULT_DATA_DIR)
    }
}

fn default_user_agent() -> String {
    format!("plughost-plugin/{}", env!("CARGO_PKG_VERSION"))
}
