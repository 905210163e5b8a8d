//! Cache engine facade
//!
//! `resolve` walks memory → disk → network for a URL and returns exactly one
//! outcome; `request` does the same in the background and publishes the
//! outcome on the event channel.

use crate::coordinator::FetchCoordinator;
use crate::decode::decode_image;
use crate::disk::DiskTier;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::key::cache_key;
use crate::memory::MemoryTier;
use crate::types::{CacheConfig, CacheEvent, CacheStats, CachedImage, HitSource};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

pub(crate) const SHUT_DOWN: &str = "cache is shut down";

/// Both tiers behind the single cache guard
pub(crate) struct Tiers {
    pub(crate) memory: MemoryTier,
    pub(crate) disk: DiskTier,
    /// Set by `CacheEngine::shutdown`; nothing is admitted afterwards
    pub(crate) closed: bool,
}

impl Tiers {
    /// Admit a freshly fetched image to memory, then disk.
    ///
    /// A disk failure is logged and leaves the memory admission in place.
    pub(crate) async fn admit(&mut self, key: &str, image: Arc<CachedImage>) {
        if self.closed {
            debug!(key = %key, "Cache is shut down, discarding fetched image");
            return;
        }
        self.memory.put(key, Arc::clone(&image));
        if let Err(e) = self.disk.put(key, &image.data).await {
            warn!(key = %key, error = %e, "Failed to cache image on disk");
        }
    }

    /// Empty both tiers. Returns the number of files that could not be deleted.
    async fn clear(&mut self) -> usize {
        self.memory.clear();
        self.disk.clear().await
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) memory_hits: AtomicU64,
    pub(crate) disk_hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) fetches: AtomicU64,
    pub(crate) failures: AtomicU64,
}

struct Inner<F> {
    config: CacheConfig,
    tiers: Arc<Mutex<Tiers>>,
    counters: Arc<Counters>,
    coordinator: FetchCoordinator<F>,
    event_tx: mpsc::Sender<CacheEvent>,
    runtime: Handle,
}

/// Two-tier image cache with network population on miss
pub struct CacheEngine<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for CacheEngine<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Fetcher> CacheEngine<F> {
    /// Create an engine, creating the cache directory if missing.
    ///
    /// Outcomes of [`CacheEngine::request`] are sent on `event_tx`. Background
    /// work is spawned on the runtime `new` is awaited on, so `request` may be
    /// called from any thread.
    pub async fn new(
        config: CacheConfig,
        fetcher: F,
        event_tx: mpsc::Sender<CacheEvent>,
    ) -> Result<Self> {
        let disk = DiskTier::new(config.cache_dir.clone(), config.disk_capacity);
        disk.init().await?;

        let tiers = Arc::new(Mutex::new(Tiers {
            memory: MemoryTier::new(config.memory_capacity),
            disk,
            closed: false,
        }));
        let counters = Arc::new(Counters::default());
        let runtime = Handle::current();
        let coordinator = FetchCoordinator::new(
            fetcher,
            Arc::clone(&tiers),
            Arc::clone(&counters),
            runtime.clone(),
        );

        info!(
            memory_capacity = config.memory_capacity,
            disk_capacity = config.disk_capacity,
            cache_dir = ?config.cache_dir,
            "Image cache initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                tiers,
                counters,
                coordinator,
                event_tx,
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Request `url` in the background; the outcome arrives on the event channel
    pub fn request(&self, url: &str) {
        let engine = self.clone();
        let url = url.to_string();
        self.inner.runtime.spawn(async move {
            let event = engine.resolve(&url).await;
            if engine.inner.event_tx.send(event).await.is_err() {
                debug!(url = %url, "Event receiver dropped, discarding outcome");
            }
        });
    }

    /// Resolve `url` to an image, consulting memory, then disk, then the network
    pub async fn resolve(&self, url: &str) -> CacheEvent {
        let key = cache_key(url);
        let counters = &self.inner.counters;

        {
            let mut tiers = self.inner.tiers.lock().await;

            if tiers.closed {
                return CacheEvent::Failed {
                    url: url.to_string(),
                    reason: SHUT_DOWN.to_string(),
                };
            }

            if let Some(image) = tiers.memory.get(&key).cloned() {
                tiers.memory.promote(&key);
                counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                debug!(url = %url, key = %key, "Memory hit");
                return CacheEvent::Ready {
                    image,
                    url: url.to_string(),
                    source: HitSource::Memory,
                };
            }

            // Guard stays held through decode and promote or purge
            if let Some(data) = tiers.disk.read(&key).await {
                match decode_image(data) {
                    Ok(image) => {
                        let image = Arc::new(image);
                        tiers.disk.promote(&key);
                        tiers.memory.put(&key, Arc::clone(&image));
                        counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                        debug!(url = %url, key = %key, "Disk hit");
                        return CacheEvent::Ready {
                            image,
                            url: url.to_string(),
                            source: HitSource::Disk,
                        };
                    }
                    Err(e) => {
                        warn!(url = %url, key = %key, error = %e, "Corrupt cache file, purging and refetching");
                        tiers.disk.remove(&key).await;
                    }
                }
            }
        }

        counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(url = %url, key = %key, "Cache miss");
        self.inner.coordinator.fetch(url, &key).await
    }

    /// Remove every cached entry from memory and disk.
    ///
    /// Both tiers are cleared inside one critical section.
    pub async fn clear(&self) {
        let mut tiers = self.inner.tiers.lock().await;
        let memory_entries = tiers.memory.len();
        let disk_entries = tiers.disk.len();

        let failed = tiers.clear().await;

        info!(memory_entries, disk_entries, failed_deletions = failed, "Cache cleared");
    }

    /// Tear the cache down: clear both tiers and stop serving requests.
    ///
    /// Later calls to `resolve` or `request` fail without touching the
    /// network, and fetches still in flight are not admitted. Calling this
    /// more than once is harmless.
    pub async fn shutdown(&self) {
        let mut tiers = self.inner.tiers.lock().await;
        if tiers.closed {
            return;
        }
        tiers.closed = true;
        let memory_entries = tiers.memory.len();
        let disk_entries = tiers.disk.len();

        let failed = tiers.clear().await;

        info!(memory_entries, disk_entries, failed_deletions = failed, "Image cache shut down");
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let (memory_entries, disk_entries) = {
            let tiers = self.inner.tiers.lock().await;
            (tiers.memory.len(), tiers.disk.len())
        };
        let counters = &self.inner.counters;

        CacheStats {
            memory_entries,
            disk_entries,
            memory_hits: counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: counters.disk_hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            fetches: counters.fetches.load(Ordering::Relaxed),
            coalesced: self.inner.coordinator.coalesced_requests(),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Number of distinct URLs currently being fetched
    pub fn in_flight(&self) -> usize {
        self.inner.coordinator.in_flight()
    }
}
