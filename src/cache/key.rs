//! Request key normalization
//!
//! A cached entry is addressed by its request URL with the fragment
//! removed. Query strings are part of the key unless a lookup asks to
//! ignore them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Normalized request URL used as the cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    /// Build a key from a URL, dropping any fragment
    pub fn from_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key with its query string removed
    pub fn without_search(&self) -> &str {
        match self.0.find('?') {
            Some(pos) => &self.0[..pos],
            None => &self.0,
        }
    }

    /// Stable file stem for on-disk storage (first 16 hex chars of SHA256)
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lookup options; all `false` reproduces platform-default matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Compare URLs without their query string
    pub ignore_search: bool,
    /// Allow non-GET requests to match stored GET entries
    pub ignore_method: bool,
    /// Skip the `Vary` header comparison
    pub ignore_vary: bool,
}
