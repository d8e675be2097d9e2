//! Named cache buckets and the storage that opens them

use crate::cache::disk::DiskStore;
use crate::cache::entry::CacheEntry;
use crate::cache::key::{MatchOptions, RequestKey};
use crate::cache::store::{BucketStore, MemoryStore};
use crate::error::{PrecacheError, PrecacheResult};
use crate::network::{Method, Request, Response};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Process-wide cache storage, shared by every handler
#[derive(Clone)]
pub struct CacheStorage {
    store: Arc<dyn BucketStore>,
}

impl CacheStorage {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }

    /// Ephemeral storage that lives as long as the process
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Persistent storage rooted at `root`
    pub fn disk(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(DiskStore::new(root)))
    }

    /// Open a bucket, creating it on first use
    pub async fn open(&self, name: &str) -> PrecacheResult<CacheBucket> {
        self.store.create(name).await?;
        Ok(CacheBucket {
            name: name.to_string(),
            store: Arc::clone(&self.store),
        })
    }

    /// Open a bucket only if it already exists
    pub async fn existing(&self, name: &str) -> PrecacheResult<CacheBucket> {
        if !self.has(name).await? {
            return Err(PrecacheError::BucketNotFound(name.to_string()));
        }
        Ok(CacheBucket {
            name: name.to_string(),
            store: Arc::clone(&self.store),
        })
    }

    pub async fn has(&self, name: &str) -> PrecacheResult<bool> {
        self.store.exists(name).await
    }

    /// Names of all buckets
    pub async fn keys(&self) -> PrecacheResult<Vec<String>> {
        self.store.names().await
    }

    /// Match a request in one bucket without creating it.
    ///
    /// A missing bucket is a miss, not an error.
    pub async fn match_in(
        &self,
        name: &str,
        request: &Request,
        options: MatchOptions,
    ) -> PrecacheResult<Option<Response>> {
        if !self.has(name).await? {
            debug!("Bucket {} does not exist yet", name);
            return Ok(None);
        }
        self.existing(name)
            .await?
            .match_request(request, options)
            .await
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}

/// Handle to one named bucket
#[derive(Clone)]
pub struct CacheBucket {
    name: String,
    store: Arc<dyn BucketStore>,
}

impl CacheBucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find the stored response for `request`
    pub async fn match_request(
        &self,
        request: &Request,
        options: MatchOptions,
    ) -> PrecacheResult<Option<Response>> {
        let found = if options.ignore_search {
            self.store
                .entries(&self.name)
                .await?
                .into_iter()
                .find(|entry| entry.matches(request, options))
        } else {
            let key = RequestKey::from_url(&request.url);
            self.store
                .get(&self.name, &key)
                .await?
                .filter(|entry| entry.matches(request, options))
        };

        Ok(found.map(|entry| entry.response))
    }

    /// Store one response under the request's key
    pub async fn put(&self, request: &Request, response: Response) -> PrecacheResult<()> {
        let entry = Self::storable(request, response)?;
        self.store.put(&self.name, entry).await
    }

    /// Store a batch of already-fetched responses.
    ///
    /// Every pair is validated before anything is written, so an invalid pair
    /// leaves the bucket untouched.
    pub async fn put_all(&self, batch: Vec<(Request, Response)>) -> PrecacheResult<()> {
        let entries = batch
            .into_iter()
            .map(|(request, response)| Self::storable(&request, response))
            .collect::<PrecacheResult<Vec<_>>>()?;

        for entry in entries {
            self.store.put(&self.name, entry).await?;
        }
        Ok(())
    }

    pub async fn keys(&self) -> PrecacheResult<Vec<RequestKey>> {
        Ok(self
            .store
            .entries(&self.name)
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect())
    }

    pub async fn entries(&self) -> PrecacheResult<Vec<CacheEntry>> {
        self.store.entries(&self.name).await
    }

    pub async fn len(&self) -> PrecacheResult<usize> {
        Ok(self.store.entries(&self.name).await?.len())
    }

    pub async fn is_empty(&self) -> PrecacheResult<bool> {
        Ok(self.len().await? == 0)
    }

    fn storable(request: &Request, response: Response) -> PrecacheResult<CacheEntry> {
        if request.method != Method::Get {
            return Err(PrecacheError::NotCacheable {
                method: request.method.to_string(),
                url: request.url.to_string(),
            });
        }
        if response.varies_on_everything() {
            return Err(PrecacheError::VaryWildcard(request.url.to_string()));
        }
        Ok(CacheEntry::new(request, response))
    }
}
