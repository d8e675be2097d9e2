//! Error types for precache
//!
//! All modules use `PrecacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for precache operations
pub type PrecacheResult<T> = Result<T, PrecacheError>;

/// All errors that can occur in precache
#[derive(Error, Debug)]
pub enum PrecacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Duplicate asset in install list: {0}")]
    DuplicateAsset(String),

    // Install errors
    #[error("Install of cache {cache} failed at {url}: {reason}")]
    InstallFailed {
        cache: String,
        url: String,
        reason: String,
    },

    // Cache errors
    #[error("Cache bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Request method {method} cannot be stored in the cache: {url}")]
    NotCacheable { method: String, url: String },

    #[error("Response for {0} carries Vary: * and cannot be stored")]
    VaryWildcard(String),

    #[error("Corrupt cache entry {path}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    // Network errors
    #[error("Network request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("Unsupported request method: {0}")]
    UnsupportedMethod(String),

    // Worker lifecycle errors
    #[error("Invalid worker state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrecacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a network error for a URL
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::BucketNotFound(_) => Some("Run: precache install"),
            Self::InstallFailed { .. } => {
                Some("Every asset must answer a plain GET with a 2xx status")
            }
            Self::Network { .. } => Some("Check that worker.origin is reachable"),
            Self::DuplicateAsset(_) => Some("Remove the repeated entry from worker.assets"),
            _ => None,
        }
    }
}
