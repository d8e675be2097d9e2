//! Cache storage for precached responses
//!
//! Buckets are named key-value stores mapping normalized requests to full
//! response snapshots. They are created lazily on first open and are never
//! deleted; changing the bucket name starts a fresh, independent bucket.
//!
//! # Matching
//!
//! | Option | Default | Effect when set |
//! |--------|---------|-----------------|
//! | `ignore_search` | false | URLs compared without query string |
//! | `ignore_method` | false | non-GET requests may match |
//! | `ignore_vary` | false | `Vary` request headers not compared |

pub mod bucket;
pub mod disk;
pub mod entry;
pub mod key;
pub mod store;

pub use bucket::{CacheBucket, CacheStorage};
pub use disk::DiskStore;
pub use entry::CacheEntry;
pub use key::{MatchOptions, RequestKey};
pub use store::{BucketStore, MemoryStore};
