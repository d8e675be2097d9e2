//! Directory-backed bucket storage
//!
//! # Layout
//!
//! ```text
//! {root}/{sanitized-name}-{hash}/
//!   bucket.json          # original bucket name + creation time
//!   {key-digest}.json    # entry metadata (request, status, headers)
//!   {key-digest}.body    # raw response body
//! ```
//!
//! Each file is written through its own temp file and renamed into place.
//! Within a process, `put` and `create` hold the store's write lock while
//! `get` and `entries` hold its read lock, so a reader never pairs one
//! version's metadata with another version's body. Separate processes
//! writing the same bucket are not coordinated.

use crate::cache::entry::CacheEntry;
use crate::cache::key::RequestKey;
use crate::cache::store::BucketStore;
use crate::error::{PrecacheError, PrecacheResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const MARKER_FILE: &str = "bucket.json";

/// Bucket marker stored at the top of each bucket directory
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketMarker {
    name: String,
    created_at: DateTime<Utc>,
}

/// Persistent bucket storage rooted at a directory
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
    /// Guards each body/metadata pair; clones share it
    lock: Arc<RwLock<()>>,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(RwLock::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a bucket: readable prefix plus a hash so distinct names never collide
    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        let readable: String = bucket
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(bucket.as_bytes());
        let hash = hex::encode(&hasher.finalize()[..6]);

        self.root.join(format!("{}-{}", readable, hash))
    }

    async fn require_bucket(&self, bucket: &str) -> PrecacheResult<PathBuf> {
        let dir = self.bucket_dir(bucket);
        if !dir.join(MARKER_FILE).exists() {
            return Err(PrecacheError::BucketNotFound(bucket.to_string()));
        }
        Ok(dir)
    }

    async fn read_marker(path: &Path) -> PrecacheResult<BucketMarker> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PrecacheError::io(format!("reading {}", path.display()), e))?;
        serde_json::from_str(&content).map_err(|e| PrecacheError::CacheCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    async fn read_entry(meta_path: &Path) -> PrecacheResult<CacheEntry> {
        let content = fs::read_to_string(meta_path)
            .await
            .map_err(|e| PrecacheError::io(format!("reading {}", meta_path.display()), e))?;
        let mut entry: CacheEntry =
            serde_json::from_str(&content).map_err(|e| PrecacheError::CacheCorrupt {
                path: meta_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let body_path = meta_path.with_extension("body");
        entry.response.body = fs::read(&body_path).await.map_err(|e| {
            PrecacheError::io(format!("reading body {}", body_path.display()), e)
        })?;

        Ok(entry)
    }

    /// Temp file next to `path`, distinct per target and per process
    fn temp_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!("{}.{}.tmp", name, std::process::id()))
    }

    /// Write through a sibling temp file so the final path is replaced atomically
    async fn write_atomic(path: &Path, contents: &[u8]) -> PrecacheResult<()> {
        let tmp = Self::temp_path(path);
        fs::write(&tmp, contents)
            .await
            .map_err(|e| PrecacheError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| PrecacheError::io(format!("renaming {}", path.display()), e))?;
        Ok(())
    }
}

#[async_trait]
impl BucketStore for DiskStore {
    async fn create(&self, bucket: &str) -> PrecacheResult<()> {
        let _guard = self.lock.write().await;
        let dir = self.bucket_dir(bucket);
        let marker_path = dir.join(MARKER_FILE);
        if marker_path.exists() {
            return Ok(());
        }

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PrecacheError::io(format!("creating bucket dir {}", dir.display()), e))?;

        let marker = BucketMarker {
            name: bucket.to_string(),
            created_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&marker)?;
        Self::write_atomic(&marker_path, content.as_bytes()).await?;

        debug!("Created cache bucket {} at {}", bucket, dir.display());
        Ok(())
    }

    async fn exists(&self, bucket: &str) -> PrecacheResult<bool> {
        Ok(self.bucket_dir(bucket).join(MARKER_FILE).exists())
    }

    async fn names(&self) -> PrecacheResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut dirs = fs::read_dir(&self.root)
            .await
            .map_err(|e| PrecacheError::io("reading cache root", e))?;

        let mut markers = Vec::new();
        while let Some(dir) = dirs
            .next_entry()
            .await
            .map_err(|e| PrecacheError::io("reading cache root entry", e))?
        {
            let marker_path = dir.path().join(MARKER_FILE);
            if !marker_path.exists() {
                continue;
            }
            match Self::read_marker(&marker_path).await {
                Ok(marker) => markers.push(marker),
                Err(e) => warn!("Skipping unreadable bucket {}: {}", dir.path().display(), e),
            }
        }

        markers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(markers.into_iter().map(|m| m.name).collect())
    }

    async fn get(&self, bucket: &str, key: &RequestKey) -> PrecacheResult<Option<CacheEntry>> {
        let _guard = self.lock.read().await;
        let dir = self.require_bucket(bucket).await?;
        let meta_path = dir.join(format!("{}.json", key.digest()));
        if !meta_path.exists() {
            return Ok(None);
        }

        let entry = Self::read_entry(&meta_path).await?;
        if &entry.key != key {
            // Digest collision: the file belongs to a different URL
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn entries(&self, bucket: &str) -> PrecacheResult<Vec<CacheEntry>> {
        let _guard = self.lock.read().await;
        let dir = self.require_bucket(bucket).await?;
        let mut files = fs::read_dir(&dir)
            .await
            .map_err(|e| PrecacheError::io(format!("reading bucket {}", dir.display()), e))?;

        let mut entries = Vec::new();
        while let Some(file) = files
            .next_entry()
            .await
            .map_err(|e| PrecacheError::io("reading bucket entry", e))?
        {
            let path = file.path();
            let is_meta = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|name| name != MARKER_FILE);
            if is_meta {
                entries.push(Self::read_entry(&path).await?);
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn put(&self, bucket: &str, entry: CacheEntry) -> PrecacheResult<()> {
        let _guard = self.lock.write().await;
        let dir = self.require_bucket(bucket).await?;
        let stem = entry.key.digest();

        Self::write_atomic(&dir.join(format!("{}.body", stem)), &entry.response.body).await?;

        let meta = serde_json::to_string_pretty(&entry)?;
        Self::write_atomic(&dir.join(format!("{}.json", stem)), meta.as_bytes()).await?;

        debug!("Stored {} in bucket {}", entry.key, bucket);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}
