//! Blob cache for encoded subtrees
//!
//! [`BlobCache`] is the persistence seam of the store: encoded subtrees are
//! written once per rank root and read back on later requests. Writes are
//! idempotent upserts keyed by `(morton, level)`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::core::{Error, Result};

/// Cache key: Morton index of a rank root and its level.
pub type BlobKey = (u64, u32);

/// Persistent byte store keyed by `(morton, level)`.
pub trait BlobCache: Send + Sync {
    /// Fetch the blob stored for a rank root, if any.
    fn get(&self, morton: u64, level: u32) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` for a rank root, replacing any previous blob.
    fn put(&self, morton: u64, level: u32, bytes: &[u8]) -> Result<()>;
}

/// LRU state behind the cache mutex
struct LruBlobs {
    /// Map of keys to encoded subtrees
    blobs: HashMap<BlobKey, Vec<u8>>,
    /// Access order: oldest first, newest last
    access_order: Vec<BlobKey>,
    /// Maximum number of blobs to keep
    max_blobs: usize,
}

impl LruBlobs {
    fn get(&mut self, key: BlobKey) -> Option<Vec<u8>> {
        if self.blobs.contains_key(&key) {
            self.update_access_order(key);
            self.blobs.get(&key).cloned()
        } else {
            None
        }
    }

    fn insert(&mut self, key: BlobKey, bytes: Vec<u8>) -> Option<Vec<u8>> {
        if self.blobs.contains_key(&key) {
            self.remove_from_access_order(key);
        }

        // Evict oldest blob if at capacity
        let evicted = if self.blobs.len() >= self.max_blobs && !self.blobs.contains_key(&key) {
            self.evict_oldest()
        } else {
            None
        };

        let replaced = self.blobs.insert(key, bytes);
        self.access_order.push(key);
        evicted.or(replaced)
    }

    fn remove(&mut self, key: BlobKey) -> Option<Vec<u8>> {
        self.remove_from_access_order(key);
        self.blobs.remove(&key)
    }

    fn evict_oldest(&mut self) -> Option<Vec<u8>> {
        let key = self.access_order.first().copied()?;
        self.remove(key)
    }

    fn update_access_order(&mut self, key: BlobKey) {
        self.remove_from_access_order(key);
        self.access_order.push(key);
    }

    fn remove_from_access_order(&mut self, key: BlobKey) {
        if let Some(pos) = self.access_order.iter().position(|&k| k == key) {
            self.access_order.remove(pos);
        }
    }
}

/// In-memory LRU blob cache
///
/// Keeps at most `max_blobs` subtrees and evicts the least recently used one
/// when full. Suitable for a single process or for tests; use
/// [`DiskBlobCache`](crate::store::DiskBlobCache) to survive restarts.
pub struct MemoryBlobCache {
    inner: Mutex<LruBlobs>,
}

impl MemoryBlobCache {
    /// Create a cache holding at most `max_blobs` subtrees
    pub fn new(max_blobs: usize) -> Self {
        Self {
            inner: Mutex::new(LruBlobs {
                blobs: HashMap::with_capacity(max_blobs.min(1024)),
                access_order: Vec::with_capacity(max_blobs.min(1024)),
                max_blobs: max_blobs.max(1),
            }),
        }
    }

    /// Create a cache that never evicts
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruBlobs>> {
        self.inner
            .lock()
            .map_err(|_| Error::storage("memory blob cache lock poisoned"))
    }

    /// Number of cached blobs
    pub fn len(&self) -> usize {
        self.lock().map(|lru| lru.blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if a blob is cached for the key. Does not touch the access order.
    pub fn contains(&self, morton: u64, level: u32) -> bool {
        self.lock()
            .map(|lru| lru.blobs.contains_key(&(morton, level)))
            .unwrap_or(false)
    }

    /// Drop the blob for a key, returning it if present
    pub fn remove(&self, morton: u64, level: u32) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.remove((morton, level)))
    }

    /// All cached keys, in no particular order
    pub fn keys(&self) -> Vec<BlobKey> {
        self.lock()
            .map(|lru| lru.blobs.keys().copied().collect())
            .unwrap_or_default()
    }
}

impl BlobCache for MemoryBlobCache {
    fn get(&self, morton: u64, level: u32) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get((morton, level)))
    }

    fn put(&self, morton: u64, level: u32, bytes: &[u8]) -> Result<()> {
        self.lock()?.insert((morton, level), bytes.to_vec());
        Ok(())
    }
}
