//! Core types for the tiered image cache

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_MEMORY_CAPACITY: usize = 50;
pub const DEFAULT_DISK_CAPACITY: usize = 200;
pub const DEFAULT_CACHE_DIR: &str = "image_cache";

/// Configuration for the cache engine, fixed at construction
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of decoded images held in memory
    pub memory_capacity: usize,
    /// Maximum number of blobs persisted on disk
    pub disk_capacity: usize,
    /// Directory holding `<key>.cache` files; created if missing
    pub cache_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            disk_capacity: DEFAULT_DISK_CAPACITY,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl CacheConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let memory_capacity = env::var("MEMORY_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MEMORY_CAPACITY);

        let disk_capacity = env::var("DISK_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DISK_CAPACITY);

        let cache_dir = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR));

        Self {
            memory_capacity,
            disk_capacity,
            cache_dir,
        }
    }
}

/// A decoded image held by the memory tier
#[derive(Debug, Clone)]
pub struct CachedImage {
    /// Bytes exactly as fetched from the network
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub image: DynamicImage,
}

impl CachedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Which layer satisfied a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Memory,
    Disk,
    Network,
}

impl fmt::Display for HitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitSource::Memory => write!(f, "memory"),
            HitSource::Disk => write!(f, "disk"),
            HitSource::Network => write!(f, "network"),
        }
    }
}

/// Outcome of a single request, published once per request
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Ready {
        image: Arc<CachedImage>,
        url: String,
        source: HitSource,
    },
    Failed {
        url: String,
        reason: String,
    },
}

impl CacheEvent {
    /// The identifier the outcome belongs to
    pub fn url(&self) -> &str {
        match self {
            CacheEvent::Ready { url, .. } | CacheEvent::Failed { url, .. } => url,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CacheEvent::Ready { .. })
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub coalesced: u64,
    pub failures: u64,
}
