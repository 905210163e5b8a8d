//! Request coalescing for cache misses.
//!
//! Concurrent misses for the same URL share one fetch: the first caller
//! becomes the leader and starts the work, later callers subscribe to the
//! leader's result. When the work completes the outcome is broadcast to every
//! subscriber and the URL is no longer in flight.

use crate::types::CacheEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Outcome of registering interest in a URL
pub(crate) enum Registration {
    /// No fetch was in flight; the caller must start one and call `complete()`
    Leader(broadcast::Receiver<CacheEvent>),
    /// A fetch is already in flight; wait on the receiver
    Follower(broadcast::Receiver<CacheEvent>),
}

/// Statistics for monitoring coalescing effectiveness
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CoalescerStats {
    pub(crate) coalesced_requests: u64,
}

/// Tracks in-flight fetches keyed by URL
pub(crate) struct RequestCoalescer {
    in_flight: Mutex<HashMap<String, broadcast::Sender<CacheEvent>>>,
    coalesced_requests: AtomicU64,
}

impl RequestCoalescer {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            coalesced_requests: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<CacheEvent>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, url: &str) -> Registration {
        let mut in_flight = self.lock();

        if let Some(tx) = in_flight.get(url) {
            self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
            debug!(url = %url, "Coalescing request onto in-flight fetch");
            return Registration::Follower(tx.subscribe());
        }

        let (tx, rx) = broadcast::channel(1);
        in_flight.insert(url.to_string(), tx);
        debug!(url = %url, in_flight = in_flight.len(), "New fetch registered");
        Registration::Leader(rx)
    }

    /// Broadcast `event` to every waiter on `url`. Returns the number of receivers.
    pub(crate) fn complete(&self, url: &str, event: CacheEvent) -> usize {
        let tx = self.lock().remove(url);
        match tx {
            Some(tx) => {
                let waiters = tx.receiver_count();
                let _ = tx.send(event);
                if waiters > 1 {
                    debug!(url = %url, waiters, "Broadcast result to coalesced waiters");
                }
                waiters
            }
            None => 0,
        }
    }

    /// Drop the in-flight entry without a result; waiters see the channel close
    pub(crate) fn abandon(&self, url: &str) {
        self.lock().remove(url);
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
        }
    }
}

impl Default for RequestCoalescer {
    fn default() -> Self {
        Self::new()
    }
}
