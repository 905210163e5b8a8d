//! Tiered Image Cache
//!
//! A two-tier (memory + disk) least-recently-used cache for images fetched over
//! HTTP. Lookups go memory → disk → network; a miss is populated by a single
//! deduplicated fetch whose result is admitted to both tiers.

mod coalesce;
mod coordinator;
mod decode;
mod disk;
mod engine;
mod error;
mod fetch;
mod key;
mod memory;
mod types;

pub use decode::decode_image;
pub use disk::DiskTier;
pub use engine::CacheEngine;
pub use error::{CacheError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use key::{cache_key, is_valid_key};
pub use memory::MemoryTier;
pub use types::{CacheConfig, CacheEvent, CacheStats, CachedImage, HitSource};
