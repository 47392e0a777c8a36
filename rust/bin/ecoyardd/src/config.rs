//! Server configuration file.
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/ecoyard"
//! in_memory = false
//!
//! [server]
//! listen = "0.0.0.0:8080"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `data.redb`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Keep documents in memory only; nothing survives a restart.
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            in_memory: false,
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ListenConfig,
}

impl ServerConfig {
    /// A bare name resolves to `/etc/ecoyard/<name>.toml`; anything that
    /// looks like a path is used as-is.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.contains('.') {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from("/etc/ecoyard").join(format!("{name_or_path}.toml"))
        }
    }

    /// Load config from disk, or return the defaults if the file doesn't exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn verify(&self) -> anyhow::Result<()> {
        if !self.storage.in_memory && self.storage.data_dir.trim().is_empty() {
            anyhow::bail!("storage.data_dir is empty in configuration");
        }
        if self.server.listen.trim().is_empty() {
            anyhow::bail!("server.listen is empty in configuration");
        }
        Ok(())
    }
}
