//! Configuration schema for precache
//!
//! Configuration is stored at `~/.config/precache/config.toml`

use crate::worker::PartialFailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bucket name used when none is configured
pub const DEFAULT_CACHE_NAME: &str = "ai-music-gen-v1";

/// Assets precached when none are configured
pub const DEFAULT_ASSETS: [&str; 3] = ["/", "/static/style.css", "/static/manifest.json"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Worker settings: bucket name, origin and asset list
    pub worker: WorkerConfig,

    /// Live network settings
    pub network: NetworkConfig,

    /// Cache storage settings
    pub storage: StorageConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Versioned bucket name; changing it starts a fresh bucket
    pub cache_name: String,

    /// Origin that root-relative asset paths are resolved against
    pub origin: String,

    /// Root-relative paths precached at install time, in order
    pub assets: Vec<String>,

    /// What to keep when one asset fails during install
    pub on_partial_failure: PartialFailurePolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            origin: "http://127.0.0.1:5000".to_string(),
            assets: DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect(),
            on_partial_failure: PartialFailurePolicy::Discard,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// User-Agent sent with every request
    pub user_agent: String,

    /// Largest response body accepted; unlimited when unset
    pub max_body_bytes: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("precache/{}", env!("CARGO_PKG_VERSION")),
            max_body_bytes: None,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Persist buckets under `storage.dir`
    #[default]
    Disk,
    /// Keep buckets in memory for the lifetime of the process
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend used for buckets
    pub backend: StorageBackend,

    /// Cache root (defaults to the platform data directory)
    pub dir: Option<PathBuf>,
}
