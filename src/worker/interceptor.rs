//! Cache-first fetch interception

use crate::cache::{CacheStorage, MatchOptions};
use crate::error::PrecacheResult;
use crate::network::{Fetcher, Request, Response};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Where an intercepted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Result of one interception
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intercepted {
    pub response: Response,
    pub source: ResponseSource,
}

/// Serves requests from a named bucket, falling back to the network.
///
/// Read-only with respect to the cache: network responses are returned to
/// the caller and never written back.
pub struct FetchInterceptor {
    cache_name: String,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    options: MatchOptions,
}

impl FetchInterceptor {
    pub fn new(
        cache_name: impl Into<String>,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            storage,
            fetcher,
            options: MatchOptions::default(),
        }
    }

    pub fn with_match_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Answer one request: stored response on a hit, one live fetch on a miss.
    ///
    /// A network failure on a miss is returned as-is; there is no fallback.
    pub async fn intercept(&self, request: &Request) -> PrecacheResult<Intercepted> {
        if let Some(response) = self
            .storage
            .match_in(&self.cache_name, request, self.options)
            .await?
        {
            debug!("Cache hit in {}: {} {}", self.cache_name, request.method, request.url);
            return Ok(Intercepted {
                response,
                source: ResponseSource::Cache,
            });
        }

        debug!("Cache miss in {}: {} {}", self.cache_name, request.method, request.url);
        let response = self.fetcher.fetch(request).await?;
        Ok(Intercepted {
            response,
            source: ResponseSource::Network,
        })
    }
}
