//! Fetch coordination for cache misses.
//!
//! The network fetch runs on its own tokio task so it neither blocks the
//! caller nor dies with it. On completion the payload is decoded, admitted to
//! memory then disk, and the single outcome is broadcast to every caller that
//! was waiting on the same URL.

use crate::coalesce::{Registration, RequestCoalescer};
use crate::decode::decode_image;
use crate::engine::{Counters, Tiers};
use crate::fetch::Fetcher;
use crate::types::{CacheEvent, HitSource};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

pub(crate) const INVALID_DATA: &str = "invalid data";

pub(crate) struct FetchCoordinator<F> {
    fetcher: Arc<F>,
    tiers: Arc<Mutex<Tiers>>,
    counters: Arc<Counters>,
    coalescer: Arc<RequestCoalescer>,
    runtime: Handle,
}

impl<F: Fetcher> FetchCoordinator<F> {
    pub(crate) fn new(
        fetcher: F,
        tiers: Arc<Mutex<Tiers>>,
        counters: Arc<Counters>,
        runtime: Handle,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            tiers,
            counters,
            coalescer: Arc::new(RequestCoalescer::new()),
            runtime,
        }
    }

    /// Fetch `url`, sharing any fetch already in flight for it
    pub(crate) async fn fetch(&self, url: &str, key: &str) -> CacheEvent {
        let rx = match self.coalescer.register(url) {
            Registration::Follower(rx) => rx,
            Registration::Leader(rx) => {
                self.spawn_fetch(url, key);
                rx
            }
        };
        wait_for_outcome(url, rx).await
    }

    pub(crate) fn coalesced_requests(&self) -> u64 {
        self.coalescer.stats().coalesced_requests
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.coalescer.in_flight_count()
    }

    fn spawn_fetch(&self, url: &str, key: &str) {
        let fetcher = Arc::clone(&self.fetcher);
        let tiers = Arc::clone(&self.tiers);
        let counters = Arc::clone(&self.counters);
        let guard = InFlight {
            coalescer: Arc::clone(&self.coalescer),
            url: Some(url.to_string()),
        };
        let url = url.to_string();
        let key = key.to_string();

        self.runtime.spawn(async move {
            let event = fetch_and_admit(fetcher.as_ref(), &tiers, &counters, &url, &key).await;
            guard.complete(event);
        });
    }
}

async fn fetch_and_admit<F: Fetcher>(
    fetcher: &F,
    tiers: &Mutex<Tiers>,
    counters: &Counters,
    url: &str,
    key: &str,
) -> CacheEvent {
    counters.fetches.fetch_add(1, Ordering::Relaxed);

    let data = match fetcher.fetch(url).await {
        Ok(data) => data,
        Err(e) => {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            if e.is_user_visible() {
                debug!(url = %url, error = %e, "Fetch failed");
            } else {
                warn!(url = %url, error = %e, "Fetch failed with local error");
            }
            return CacheEvent::Failed {
                url: url.to_string(),
                reason: e.to_string(),
            };
        }
    };

    let image = match decode_image(data) {
        Ok(image) => Arc::new(image),
        Err(e) => {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            debug!(url = %url, error = %e, "Fetched payload is not a valid image");
            return CacheEvent::Failed {
                url: url.to_string(),
                reason: INVALID_DATA.to_string(),
            };
        }
    };

    tiers.lock().await.admit(key, Arc::clone(&image)).await;

    CacheEvent::Ready {
        image,
        url: url.to_string(),
        source: HitSource::Network,
    }
}

async fn wait_for_outcome(url: &str, mut rx: broadcast::Receiver<CacheEvent>) -> CacheEvent {
    match rx.recv().await {
        Ok(event) => event,
        Err(e) => {
            warn!(url = %url, error = %e, "Fetch ended without an outcome");
            CacheEvent::Failed {
                url: url.to_string(),
                reason: "fetch aborted".to_string(),
            }
        }
    }
}

/// Keeps a URL registered as in flight until its outcome is published.
///
/// If the fetch task unwinds before completing, dropping the guard releases
/// the waiters instead of leaving them parked forever.
struct InFlight {
    coalescer: Arc<RequestCoalescer>,
    url: Option<String>,
}

impl InFlight {
    fn complete(mut self, event: CacheEvent) {
        if let Some(url) = self.url.take() {
            self.coalescer.complete(&url, event);
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(url) = self.url.take() {
            self.coalescer.abandon(&url);
        }
    }
}
