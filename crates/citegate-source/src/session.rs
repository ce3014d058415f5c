//! In-process session cache: a bounded LRU over fetch results.
//!
//! Owned exclusively by the fetcher. Cached entries never carry excerpts;
//! those are recomputed per request so a read for one query can never
//! leak excerpts computed for another.

use std::num::NonZeroUsize;

use lru::LruCache;

use citegate_common::types::FetchedSource;

pub const DEFAULT_SESSION_CACHE_CAPACITY: usize = 500;

pub struct SessionCache {
    entries: LruCache<String, FetchedSource>,
    evictions: u64,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_SESSION_CACHE_CAPACITY).unwrap());
        Self {
            entries: LruCache::new(capacity),
            evictions: 0,
        }
    }

    /// Clone of the cached entry, promoting it to most recently used.
    pub fn get(&mut self, url: &str) -> Option<FetchedSource> {
        self.entries.get(url).cloned()
    }

    /// Insert, counting any eviction of a *different* URL.
    pub fn insert(&mut self, source: FetchedSource) {
        let url = source.url.clone();
        if let Some((evicted_url, _)) = self.entries.push(url.clone(), source) {
            if evicted_url != url {
                self.evictions += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
