//! Storage backends for cache buckets
//!
//! A [`BucketStore`] holds named buckets of [`CacheEntry`] values keyed by
//! [`RequestKey`]. Buckets are created explicitly and never deleted.

use crate::cache::entry::CacheEntry;
use crate::cache::key::RequestKey;
use crate::error::{PrecacheError, PrecacheResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Abstract bucket storage
///
/// Implemented by an in-process map for tests and ephemeral runs, and by a
/// directory tree for persistence across restarts.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Create a bucket if it does not exist yet
    async fn create(&self, bucket: &str) -> PrecacheResult<()>;

    /// Check whether a bucket exists
    async fn exists(&self, bucket: &str) -> PrecacheResult<bool>;

    /// Names of all buckets
    async fn names(&self) -> PrecacheResult<Vec<String>>;

    /// Look up one entry by exact key
    async fn get(&self, bucket: &str, key: &RequestKey) -> PrecacheResult<Option<CacheEntry>>;

    /// All entries of a bucket, ordered by key
    async fn entries(&self, bucket: &str) -> PrecacheResult<Vec<CacheEntry>>;

    /// Insert or replace the entry stored under `entry.key`
    async fn put(&self, bucket: &str, entry: CacheEntry) -> PrecacheResult<()>;

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// In-process bucket storage
#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<RequestKey, CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BucketStore for MemoryStore {
    async fn create(&self, bucket: &str) -> PrecacheResult<()> {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    async fn exists(&self, bucket: &str) -> PrecacheResult<bool> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn names(&self) -> PrecacheResult<Vec<String>> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn get(&self, bucket: &str, key: &RequestKey) -> PrecacheResult<Option<CacheEntry>> {
        let buckets = self.buckets.read().await;
        let entries = buckets
            .get(bucket)
            .ok_or_else(|| PrecacheError::BucketNotFound(bucket.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn entries(&self, bucket: &str) -> PrecacheResult<Vec<CacheEntry>> {
        let buckets = self.buckets.read().await;
        let entries = buckets
            .get(bucket)
            .ok_or_else(|| PrecacheError::BucketNotFound(bucket.to_string()))?;
        Ok(entries.values().cloned().collect())
    }

    async fn put(&self, bucket: &str, entry: CacheEntry) -> PrecacheResult<()> {
        let mut buckets = self.buckets.write().await;
        let entries = buckets
            .get_mut(bucket)
            .ok_or_else(|| PrecacheError::BucketNotFound(bucket.to_string()))?;
        entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
