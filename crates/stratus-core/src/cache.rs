//! Read-through metadata cache.
//!
//! An LRU of encoded records keyed by index key, sitting in front of the
//! index gateway for hot metadata (object records, user records, bucket
//! instances). The cache is advisory: every mutation path updates or
//! invalidates the affected key after its index write succeeds, and a
//! cross-process notification hook exists for peers to do the same. In
//! this process the hook delivers nowhere; receiving a notification
//! invalidates the key.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::CoreResult;

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Bytes,
    mtime_ms: i64,
    tick: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    // (key, tick) pairs in insertion order; stale pairs whose tick no
    // longer matches the live entry are dropped lazily during eviction.
    order: VecDeque<(String, u64)>,
    tick: u64,
}

/// An LRU metadata cache.
#[derive(Debug)]
pub struct MetaCache {
    name: &'static str,
    capacity: usize,
    inner: Mutex<CacheInner>,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetaCache {
    /// Create a cache holding up to `capacity` entries. A disabled cache
    /// is pass-through: gets miss, puts drop.
    #[must_use]
    pub fn new(name: &'static str, capacity: usize, enabled: bool) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
            enabled: AtomicBool::new(enabled),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up an encoded record.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Bytes> {
        if !self.enabled.load(Ordering::Relaxed) {
            return None;
        }
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let hit = inner.map.get_mut(key).map(|entry| {
            entry.tick = tick;
            entry.data.clone()
        });
        match hit {
            Some(data) => {
                inner.order.push_back((key.to_owned(), tick));
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(cache = self.name, key, "cache hit");
                Some(data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(cache = self.name, key, "cache miss");
                None
            }
        }
    }

    /// Insert or refresh an encoded record, then notify peers.
    pub fn put(&self, key: &str, data: Bytes) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        {
            let mut inner = self.inner.lock();
            inner.tick += 1;
            let tick = inner.tick;
            inner.map.insert(
                key.to_owned(),
                CacheEntry {
                    data,
                    mtime_ms: Utc::now().timestamp_millis(),
                    tick,
                },
            );
            inner.order.push_back((key.to_owned(), tick));
            Self::evict(&mut inner, self.capacity);
        }
        if let Err(e) = self.distribute(key) {
            tracing::warn!(cache = self.name, key, error = %e, "cache distribute failed");
        }
    }

    /// Drop an entry, then notify peers.
    pub fn invalidate_remove(&self, key: &str) {
        {
            let mut inner = self.inner.lock();
            inner.map.remove(key);
        }
        if let Err(e) = self.distribute(key) {
            tracing::warn!(cache = self.name, key, error = %e, "cache distribute failed");
        }
        trace!(cache = self.name, key, "cache invalidate");
    }

    /// Toggle the cache. Disabling drops all entries.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            let mut inner = self.inner.lock();
            inner.map.clear();
            inner.order.clear();
        }
    }

    /// Cross-process invalidation hook. Peers that change an entry call
    /// this; in-process delivery has nowhere to go yet.
    fn distribute(&self, _key: &str) -> CoreResult<()> {
        Ok(())
    }

    /// Delivery side of the notification hook: a peer changed `key`.
    pub fn notify(&self, key: &str) {
        self.invalidate_remove(key);
    }

    /// Hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Age in milliseconds of a cached entry (diagnostics).
    #[must_use]
    pub fn entry_age_ms(&self, key: &str) -> Option<i64> {
        let inner = self.inner.lock();
        inner
            .map
            .get(key)
            .map(|e| Utc::now().timestamp_millis() - e.mtime_ms)
    }

    fn evict(inner: &mut CacheInner, capacity: usize) {
        while inner.map.len() > capacity {
            let Some((key, tick)) = inner.order.pop_front() else {
                break;
            };
            let live = inner.map.get(&key).is_some_and(|e| e.tick == tick);
            if live {
                inner.map.remove(&key);
            }
            // Stale order pairs (the entry was touched since) just drop.
        }
    }
}
