//! Install-time precaching of the asset list

use crate::cache::{CacheStorage, RequestKey};
use crate::error::{PrecacheError, PrecacheResult};
use crate::network::{Fetcher, Request, Response};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// What happens to already-fetched assets when another asset fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialFailurePolicy {
    /// Fetch everything first; write only if every fetch succeeded
    #[default]
    Discard,
    /// Write each asset as soon as it arrives; earlier writes survive a failure
    Retain,
}

impl fmt::Display for PartialFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => write!(f, "discard"),
            Self::Retain => write!(f, "retain"),
        }
    }
}

/// Callbacks during an install.
///
/// All methods default to no-ops.
pub trait InstallProgress: Send + Sync {
    /// Called once before any asset is fetched
    fn on_start(&self, _cache: &str, _total: usize) {}

    /// Called when an asset has been fetched and accepted
    fn on_asset_fetched(&self, _url: &Url, _bytes: u64) {}

    /// Called when an asset fails the install
    fn on_asset_failed(&self, _url: &Url, _error: &str) {}
}

/// Progress observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl InstallProgress for NoProgress {}

/// Outcome of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub cache_name: String,
    pub entries: usize,
    pub bytes: u64,
}

/// Populates a named bucket with a fixed asset list
pub struct Installer {
    cache_name: String,
    assets: Vec<Url>,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    policy: PartialFailurePolicy,
    progress: Arc<dyn InstallProgress>,
}

impl Installer {
    pub fn new(
        cache_name: impl Into<String>,
        assets: Vec<Url>,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            assets,
            storage,
            fetcher,
            policy: PartialFailurePolicy::default(),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_policy(mut self, policy: PartialFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn InstallProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn assets(&self) -> &[Url] {
        &self.assets
    }

    pub fn policy(&self) -> PartialFailurePolicy {
        self.policy
    }

    /// Fetch every asset and store it in the bucket.
    ///
    /// Fails as a whole if any asset fails. No retries.
    pub async fn install(&self) -> PrecacheResult<InstallReport> {
        self.check_duplicates()?;

        let bucket = self.storage.open(&self.cache_name).await?;
        self.progress.on_start(&self.cache_name, self.assets.len());
        debug!(
            "Installing {} assets into {} (policy: {})",
            self.assets.len(),
            self.cache_name,
            self.policy
        );

        let result = match self.policy {
            PartialFailurePolicy::Discard => {
                let fetches = self.assets.iter().map(|url| self.fetch_asset(url));
                match try_join_all(fetches).await {
                    Ok(batch) => {
                        let bytes = total_bytes(batch.iter().map(|(_, r)| r));
                        bucket.put_all(batch).await.map(|()| bytes)
                    }
                    Err(e) => Err(e),
                }
            }
            PartialFailurePolicy::Retain => {
                let writes = self.assets.iter().map(|url| {
                    let bucket = bucket.clone();
                    async move {
                        let (request, response) = self.fetch_asset(url).await?;
                        let bytes = response.body.len() as u64;
                        bucket.put(&request, response).await?;
                        Ok::<u64, PrecacheError>(bytes)
                    }
                });
                try_join_all(writes).await.map(|sizes| sizes.into_iter().sum())
            }
        };

        match result {
            Ok(bytes) => {
                info!(
                    "Installed {} assets into cache {}",
                    self.assets.len(),
                    self.cache_name
                );
                Ok(InstallReport {
                    cache_name: self.cache_name.clone(),
                    entries: self.assets.len(),
                    bytes,
                })
            }
            Err(e) => {
                warn!("Install of cache {} failed: {}", self.cache_name, e);
                Err(e)
            }
        }
    }

    /// Two assets resolving to the same key make the batch ambiguous
    fn check_duplicates(&self) -> PrecacheResult<()> {
        let mut seen = HashSet::new();
        for url in &self.assets {
            if !seen.insert(RequestKey::from_url(url)) {
                return Err(PrecacheError::DuplicateAsset(url.to_string()));
            }
        }
        Ok(())
    }

    async fn fetch_asset(&self, url: &Url) -> PrecacheResult<(Request, Response)> {
        let request = Request::get(url.clone());

        let outcome = match self.fetcher.fetch(&request).await {
            Err(e) => Err(e.to_string()),
            Ok(response) if !response.ok() => Err(format!("HTTP {}", response.status)),
            Ok(response) if response.varies_on_everything() => {
                Err("response carries Vary: *".to_string())
            }
            Ok(response) => Ok(response),
        };

        match outcome {
            Ok(response) => {
                self.progress
                    .on_asset_fetched(url, response.body.len() as u64);
                Ok((request, response))
            }
            Err(reason) => {
                self.progress.on_asset_failed(url, &reason);
                Err(PrecacheError::InstallFailed {
                    cache: self.cache_name.clone(),
                    url: url.to_string(),
                    reason,
                })
            }
        }
    }
}

fn total_bytes<'a>(responses: impl Iterator<Item = &'a Response>) -> u64 {
    responses.map(|r| r.body.len() as u64).sum()
}
