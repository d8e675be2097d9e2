//! Configuration management for precache

pub mod schema;

pub use schema::Config;

use crate::cache::CacheStorage;
use crate::error::{PrecacheError, PrecacheResult};
use schema::StorageBackend;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("precache")
            .join("config.toml")
    }

    /// Get the default cache storage root
    pub fn default_cache_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("precache")
            .join("caches")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> PrecacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        let config = self.load_from_file(&self.config_path).await?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Log format named by the config file, read before logging is set up
    ///
    /// Falls back to "text" when the file is missing or does not parse; the
    /// real load reports those errors once tracing is running.
    pub fn log_format(&self) -> String {
        std::fs::read_to_string(&self.config_path)
            .ok()
            .and_then(|content| content.parse::<toml::Table>().ok())
            .and_then(|table| {
                table
                    .get("general")?
                    .get("log_format")?
                    .as_str()
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "text".to_string())
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> PrecacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PrecacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| PrecacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Check values serde cannot: origin shape and asset list contents
    pub fn validate(&self, config: &Config) -> PrecacheResult<()> {
        let invalid = |reason: String| PrecacheError::ConfigInvalid {
            path: self.config_path.clone(),
            reason,
        };

        if config.worker.cache_name.trim().is_empty() {
            return Err(invalid("worker.cache_name must not be empty".to_string()));
        }

        crate::worker::parse_origin(&config.worker.origin)
            .map_err(|e| invalid(format!("worker.origin: {}", e)))?;

        let mut seen = HashSet::new();
        for asset in &config.worker.assets {
            if !asset.starts_with('/') {
                return Err(invalid(format!(
                    "worker.assets entry '{}' must be root-relative (start with '/')",
                    asset
                )));
            }
            if asset.starts_with("//") {
                return Err(invalid(format!(
                    "worker.assets entry '{}' is scheme-relative and would leave the origin",
                    asset
                )));
            }
            if !seen.insert(asset.as_str()) {
                return Err(invalid(format!("worker.assets lists '{}' twice", asset)));
            }
        }

        if config.network.timeout_secs == 0 {
            return Err(invalid("network.timeout_secs must be positive".to_string()));
        }

        if config.network.max_body_bytes == Some(0) {
            return Err(invalid("network.max_body_bytes must be positive".to_string()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> PrecacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            PrecacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> PrecacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PrecacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Build cache storage for the configured backend
    pub fn storage(config: &Config) -> CacheStorage {
        match config.storage.backend {
            StorageBackend::Memory => CacheStorage::memory(),
            StorageBackend::Disk => {
                let dir = config
                    .storage
                    .dir
                    .clone()
                    .unwrap_or_else(Self::default_cache_dir);
                debug!("Using cache storage at {}", dir.display());
                CacheStorage::disk(dir)
            }
        }
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
