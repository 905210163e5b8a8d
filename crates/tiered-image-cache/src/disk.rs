//! File-backed LRU tier
//!
//! Each admitted key is persisted as `<cache_dir>/<key>.cache` holding the raw
//! fetched bytes. The index only knows about files written by this process;
//! leftovers from an earlier run are never read.

use crate::error::{CacheError, Result};
use crate::key::is_valid_key;
use lru::LruCache;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const FILE_SUFFIX: &str = ".cache";

/// Bounded on-disk store; capacity counts files, not bytes.
#[derive(Debug)]
pub struct DiskTier {
    cache_dir: PathBuf,
    capacity: usize,
    index: LruCache<String, ()>,
}

impl DiskTier {
    pub fn new(cache_dir: PathBuf, capacity: usize) -> Self {
        Self {
            cache_dir,
            capacity,
            index: LruCache::unbounded(),
        }
    }

    /// Ensure the cache directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            CacheError::Config(format!(
                "cannot create cache directory {}: {}",
                self.cache_dir.display(),
                e
            ))
        })?;
        info!(cache_dir = ?self.cache_dir, capacity = self.capacity, "Disk tier initialized");
        Ok(())
    }

    /// Path of the file backing `key`.
    ///
    /// Only keys shaped like [`crate::cache_key`] output are accepted, so the
    /// result never leaves the cache directory.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.cache_dir.join(format!("{}{}", key, FILE_SUFFIX)))
    }

    pub fn has(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Persist `data` under `key`, evicting least-recently-used files first.
    ///
    /// The key is only recorded once the write has succeeded.
    pub async fn put(&mut self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;

        if self.capacity == 0 {
            debug!(key = %key, "Disk tier has zero capacity, not admitting");
            return Ok(());
        }

        if !self.index.contains(key) {
            while self.index.len() >= self.capacity {
                if !self.evict_one().await {
                    break;
                }
            }
        }

        if let Err(e) = fs::write(&path, data).await {
            warn!(key = %key, path = ?path, error = %e, "Failed to write cache file");
            // A failed overwrite leaves the old file in an unknown state
            self.index.pop(key);
            let _ = fs::remove_file(&path).await;
            return Err(e.into());
        }

        self.index.put(key.to_string(), ());
        debug!(key = %key, size = data.len(), files = self.index.len(), "Admitted to disk tier");
        Ok(())
    }

    /// Read the bytes stored under `key` without changing its recency.
    ///
    /// A tracked key whose file is gone or unreadable is purged and reported
    /// as a miss.
    pub async fn read(&mut self, key: &str) -> Option<Vec<u8>> {
        if !self.index.contains(key) {
            return None;
        }
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(_) => {
                self.index.pop(key);
                return None;
            }
        };

        match fs::read(&path).await {
            Ok(data) => Some(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %key, "Cache file missing, purging stale index entry");
                self.index.pop(key);
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cached file, removing entry");
                self.remove(key).await;
                None
            }
        }
    }

    /// Mark `key` most-recently-used; no-op if absent
    pub fn promote(&mut self, key: &str) -> bool {
        if !self.index.contains(key) {
            return false;
        }
        self.index.promote(key);
        true
    }

    /// Forget `key` and delete its file. Returns whether it was tracked.
    pub async fn remove(&mut self, key: &str) -> bool {
        if self.index.pop(key).is_none() {
            return false;
        }
        if let Ok(path) = self.path_for(key) {
            delete_file(key, &path).await;
        }
        true
    }

    /// Drop least-recently-used files until the tier is within capacity.
    /// Returns the number of entries evicted.
    pub async fn evict_to_capacity(&mut self) -> usize {
        let mut evicted = 0;
        while self.index.len() > self.capacity && self.evict_one().await {
            evicted += 1;
        }
        evicted
    }

    /// Delete every tracked file, then empty the index.
    ///
    /// Returns the number of files that could not be deleted.
    pub async fn clear(&mut self) -> usize {
        let mut failed = 0;
        for key in self.keys() {
            if let Ok(path) = self.path_for(&key) {
                if !delete_file(&key, &path).await {
                    failed += 1;
                }
            }
        }
        self.index.clear();
        failed
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Keys most-recently-used first
    pub fn keys(&self) -> Vec<String> {
        self.index.iter().map(|(key, _)| key.clone()).collect()
    }

    async fn evict_one(&mut self) -> bool {
        let Some((key, ())) = self.index.pop_lru() else {
            return false;
        };
        // Index entry is gone even if the file survives
        if let Ok(path) = self.path_for(&key) {
            delete_file(&key, &path).await;
        }
        debug!(key = %key, "Evicted least recently used cache file");
        true
    }
}

/// Remove a cache file, logging failures. A file that is already gone counts
/// as removed.
async fn delete_file(key: &str, path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(key = %key, path = ?path, error = %e, "Failed to delete cache file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::cache_key;
    use tempfile::tempdir;

    async fn new_tier(dir: &Path, capacity: usize) -> DiskTier {
        let tier = DiskTier::new(dir.to_path_buf(), capacity);
        tier.init().await.unwrap();
        tier
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_init_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let tier = DiskTier::new(nested.clone(), 4);
        tier.init().await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_init_fails_when_path_is_a_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let tier = DiskTier::new(file, 4);
        let result = tier.init().await;
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_put_and_read() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 4).await;
        let key = cache_key("https://example.com/a.png");

        tier.put(&key, b"hello").await.unwrap();
        assert!(tier.has(&key));
        assert_eq!(tier.read(&key).await, Some(b"hello".to_vec()));

        // Raw bytes verbatim under <key>.cache
        let on_disk = std::fs::read(dir.path().join(format!("{}.cache", key))).unwrap();
        assert_eq!(on_disk, b"hello");
    }

    #[tokio::test]
    async fn test_read_untracked_key_is_miss() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 4).await;
        let key = cache_key("https://example.com/orphan.png");

        // A file from an earlier run is not indexed
        std::fs::write(dir.path().join(format!("{}.cache", key)), b"old").unwrap();
        assert!(!tier.has(&key));
        assert_eq!(tier.read(&key).await, None);
    }

    #[tokio::test]
    async fn test_path_for_rejects_traversal() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 4).await;

        assert!(matches!(
            tier.path_for("../../etc/passwd"),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(tier.put("../escape", b"x").await.is_err());
        assert_eq!(tier.len(), 0);
    }

    #[tokio::test]
    async fn test_eviction_deletes_least_recent_file() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 2).await;
        let a = cache_key("a");
        let b = cache_key("b");
        let c = cache_key("c");

        tier.put(&a, b"a").await.unwrap();
        tier.put(&b, b"b").await.unwrap();
        tier.promote(&a);
        tier.put(&c, b"c").await.unwrap();

        assert!(tier.has(&a));
        assert!(!tier.has(&b));
        assert!(tier.has(&c));
        assert!(!tier.path_for(&b).unwrap().exists());
        assert_eq!(count_files(dir.path()), 2);
    }

    #[tokio::test]
    async fn test_evict_to_capacity_deletes_oldest_files() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 4).await;
        let keys: Vec<String> = ["a", "b", "c", "d"].iter().map(|k| cache_key(k)).collect();
        for key in &keys {
            tier.put(key, key.as_bytes()).await.unwrap();
        }
        tier.promote(&keys[0]);

        // Shrink below the current size
        tier.capacity = 2;
        assert_eq!(tier.evict_to_capacity().await, 2);
        assert_eq!(tier.keys(), vec![keys[0].clone(), keys[3].clone()]);
        assert!(!tier.path_for(&keys[1]).unwrap().exists());
        assert!(!tier.path_for(&keys[2]).unwrap().exists());
        assert!(tier.path_for(&keys[0]).unwrap().exists());
        assert_eq!(count_files(dir.path()), 2);

        assert_eq!(tier.evict_to_capacity().await, 0);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 2).await;
        let a = cache_key("a");
        let b = cache_key("b");

        tier.put(&a, b"a1").await.unwrap();
        tier.put(&b, b"b").await.unwrap();
        tier.put(&a, b"a2").await.unwrap();

        assert_eq!(tier.len(), 2);
        assert_eq!(tier.keys(), vec![a.clone(), b.clone()]);
        assert_eq!(tier.read(&a).await, Some(b"a2".to_vec()));
    }

    #[tokio::test]
    async fn test_failed_write_is_not_recorded() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 4).await;
        let key = cache_key("https://example.com/blocked.png");

        // A directory where the file should go makes the write fail
        std::fs::create_dir(tier.path_for(&key).unwrap()).unwrap();

        let result = tier.put(&key, b"data").await;
        assert!(matches!(result, Err(CacheError::Storage(_))));
        assert!(!tier.has(&key));
        assert_eq!(tier.len(), 0);
    }

    #[tokio::test]
    async fn test_externally_deleted_file_is_purged() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 4).await;
        let key = cache_key("https://example.com/gone.png");

        tier.put(&key, b"data").await.unwrap();
        std::fs::remove_file(tier.path_for(&key).unwrap()).unwrap();

        assert_eq!(tier.read(&key).await, None);
        assert!(!tier.has(&key));
        assert_eq!(tier.len(), 0);
    }

    #[tokio::test]
    async fn test_clear_removes_all_files() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 8).await;
        for i in 0..5 {
            tier.put(&cache_key(&i.to_string()), b"x").await.unwrap();
        }
        assert_eq!(count_files(dir.path()), 5);

        assert_eq!(tier.clear().await, 0);
        assert!(tier.is_empty());
        assert_eq!(count_files(dir.path()), 0);

        // Idempotent
        assert_eq!(tier.clear().await, 0);
        assert!(tier.is_empty());
    }

    #[tokio::test]
    async fn test_clear_continues_past_failed_deletion() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 8).await;
        let stuck = cache_key("stuck");
        let others: Vec<String> = (0..3).map(|i| cache_key(&i.to_string())).collect();

        tier.put(&stuck, b"x").await.unwrap();
        for key in &others {
            tier.put(key, b"y").await.unwrap();
        }

        // Swap the file for a directory so deleting it fails
        let stuck_path = tier.path_for(&stuck).unwrap();
        std::fs::remove_file(&stuck_path).unwrap();
        std::fs::create_dir(&stuck_path).unwrap();

        assert_eq!(tier.clear().await, 1);
        assert!(tier.is_empty());
        for key in &others {
            assert!(!tier.path_for(key).unwrap().exists());
        }
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 4).await;
        let key = cache_key("r");

        tier.put(&key, b"x").await.unwrap();
        assert!(tier.remove(&key).await);
        assert!(!tier.remove(&key).await);
        assert!(!tier.path_for(&key).unwrap().exists());
    }

    #[tokio::test]
    async fn test_zero_capacity_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut tier = new_tier(dir.path(), 0).await;
        tier.put(&cache_key("z"), b"x").await.unwrap();
        assert!(tier.is_empty());
        assert_eq!(count_files(dir.path()), 0);
    }
}
