//! Process-wide market snapshot cache.
//!
//! Keyed by market id and shared by every watcher instance. An entry is
//! fresh strictly before `fetched_at + ttl`; at the boundary instant it is
//! stale. Concurrent fetches for one market id are coalesced through a
//! per-market async lock: the second caller waits, re-checks the cache, and
//! serves the first caller's result instead of issuing a duplicate request.

use crate::market::MarketSnapshot;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Clone)]
struct CacheEntry {
    snapshot: MarketSnapshot,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.fetched_at) < self.ttl
    }
}

/// Shared snapshot cache with per-market fetch coalescing.
#[derive(Clone)]
pub struct SnapshotCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    fetch_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            fetch_locks: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// A fresh snapshot for `market_id`, or None. Expired entries are
    /// removed on read.
    pub fn get_fresh(&self, market_id: &str) -> Option<MarketSnapshot> {
        let fresh = self
            .entries
            .get(market_id)
            .filter(|e| e.is_fresh(Instant::now()))
            .map(|e| e.snapshot.clone());
        if fresh.is_none() {
            self.entries.remove(market_id);
        }
        fresh
    }

    pub fn insert(&self, market_id: &str, snapshot: MarketSnapshot) {
        self.insert_at(market_id, snapshot, Instant::now());
    }

    fn insert_at(&self, market_id: &str, snapshot: MarketSnapshot, fetched_at: Instant) {
        self.entries.insert(
            market_id.to_string(),
            CacheEntry {
                snapshot,
                fetched_at,
                ttl: self.ttl,
            },
        );
    }

    pub fn invalidate(&self, market_id: &str) {
        if self.entries.remove(market_id).is_some() {
            debug!(market = market_id, "cache entry invalidated");
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serve a fresh entry, or run `fetch` with at most one outstanding
    /// fetch per market id. A caller that finds the per-market lock held
    /// waits for the holder, then serves the entry the holder cached.
    pub async fn fetch_coalesced<F, Fut, E>(
        &self,
        market_id: &str,
        fetch: F,
    ) -> Result<MarketSnapshot, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MarketSnapshot, E>>,
    {
        if let Some(snapshot) = self.get_fresh(market_id) {
            debug!(market = market_id, "market served from cache");
            return Ok(snapshot);
        }

        let lock = self
            .fetch_locks
            .entry(market_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have completed the fetch while we waited.
        if let Some(snapshot) = self.get_fresh(market_id) {
            debug!(market = market_id, "market served from coalesced fetch");
            return Ok(snapshot);
        }

        let snapshot = fetch().await?;
        self.insert(market_id, snapshot.clone());
        Ok(snapshot)
    }
}
