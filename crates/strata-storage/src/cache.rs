//! Read-side data cache
//!
//! Keeps recently read object payloads in memory, keyed by physical
//! location, so repeat reads skip the backend. The cache is advisory:
//! disabling or clearing it changes latency only, never what a read returns.
//!
//! Callers invalidate a location after the backend mutation is durable and
//! before acknowledging it. Read-through fills go through
//! [`DataCache::begin_fill`] / [`DataCache::complete_fill`], which drop any
//! fill that started before an invalidation, so a slow read cannot put
//! stale bytes back after the writer has invalidated them.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_common::ObjectLocation;
use strata_common::config::CacheConfig;
use tracing::trace;

/// Individual cache entry with LRU tracking
struct CacheEntry {
    data: Bytes,
    /// Logical time of insertion (freshness stamp)
    stamp: u64,
    /// Last access time for LRU eviction
    last_access: AtomicU64,
}

impl CacheEntry {
    fn new(data: Bytes, clock: u64) -> Self {
        Self {
            data,
            stamp: clock,
            last_access: AtomicU64::new(clock),
        }
    }

    fn touch(&self, clock: u64) {
        self.last_access.store(clock, Ordering::Relaxed);
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: AtomicU64,
    /// Number of cache misses
    pub misses: AtomicU64,
    /// Number of payloads inserted or refreshed
    pub insertions: AtomicU64,
    /// Number of entries evicted to honor the size bound
    pub evictions: AtomicU64,
    /// Number of entries removed by invalidation
    pub invalidations: AtomicU64,
    /// Read-through fills dropped because an invalidation overtook them
    pub rejected_fills: AtomicU64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.insertions.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
        self.rejected_fills.store(0, Ordering::Relaxed);
    }
}

/// Proof that a read-through fill started at a given invalidation epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillTicket {
    location: ObjectLocation,
    epoch: u64,
}

impl FillTicket {
    #[must_use]
    pub const fn location(&self) -> &ObjectLocation {
        &self.location
    }
}

struct CacheState {
    entries: HashMap<ObjectLocation, CacheEntry>,
    used_bytes: u64,
    /// Bumped by every invalidation and clear
    epoch: u64,
}

/// LRU payload cache bounded by aggregate size
pub struct DataCache {
    state: RwLock<CacheState>,
    enabled: bool,
    max_bytes: u64,
    max_entry_size: u64,
    /// Logical clock for LRU ordering
    clock: AtomicU64,
    stats: CacheStats,
}

impl DataCache {
    /// Create an enabled cache
    #[must_use]
    pub fn new(max_bytes: u64, max_entry_size: u64) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                used_bytes: 0,
                epoch: 0,
            }),
            enabled: true,
            max_bytes,
            max_entry_size: max_entry_size.min(max_bytes),
            clock: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    /// Create a cache that never stores anything
    #[must_use]
    pub fn disabled() -> Self {
        let mut cache = Self::new(0, 0);
        cache.enabled = false;
        cache
    }

    /// Build a cache from configuration
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        if config.enabled {
            Self::new(config.max_bytes, config.max_entry_size)
        } else {
            Self::disabled()
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Largest payload that will be cached
    #[must_use]
    pub const fn max_entry_size(&self) -> u64 {
        self.max_entry_size
    }

    /// Whether a payload of `size` bytes would be admitted
    #[must_use]
    pub const fn admits(&self, size: u64) -> bool {
        self.enabled && size <= self.max_entry_size
    }

    /// Get cache statistics
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the current number of entries in the cache
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Sum of cached payload sizes
    pub fn used_bytes(&self) -> u64 {
        self.state.read().used_bytes
    }

    /// Check if a location is cached
    pub fn contains(&self, location: &ObjectLocation) -> bool {
        self.state.read().entries.contains_key(location)
    }

    /// Freshness stamp of a cached entry
    pub fn entry_stamp(&self, location: &ObjectLocation) -> Option<u64> {
        self.state.read().entries.get(location).map(|e| e.stamp)
    }

    /// Advance the logical clock and return the new value
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a payload. Never touches the backend.
    pub fn get(&self, location: &ObjectLocation) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }
        let state = self.state.read();
        if let Some(entry) = state.entries.get(location) {
            entry.touch(self.tick());
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.data.clone())
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert or refresh a payload, evicting LRU entries to stay within the
    /// size bound. Returns false if the payload was not admitted.
    pub fn put(&self, location: ObjectLocation, data: Bytes) -> bool {
        if !self.admits(data.len() as u64) {
            return false;
        }
        let mut state = self.state.write();
        self.insert_locked(&mut state, location, data);
        true
    }

    /// Remove a location immediately. Returns true if it was cached.
    pub fn invalidate(&self, location: &ObjectLocation) -> bool {
        if !self.enabled {
            return false;
        }
        let mut state = self.state.write();
        state.epoch += 1;
        if let Some(entry) = state.entries.remove(location) {
            state.used_bytes -= entry.size();
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
            trace!(%location, "cache entry invalidated");
            true
        } else {
            false
        }
    }

    /// Start a read-through fill; call before reading the backend
    pub fn begin_fill(&self, location: &ObjectLocation) -> FillTicket {
        FillTicket {
            location: location.clone(),
            epoch: self.state.read().epoch,
        }
    }

    /// Finish a read-through fill.
    ///
    /// The payload is dropped if any invalidation happened since the ticket
    /// was issued. The check is cache-wide, so an unrelated invalidation can
    /// cost a fill but never admits stale data.
    pub fn complete_fill(&self, ticket: FillTicket, data: Bytes) -> bool {
        if !self.admits(data.len() as u64) {
            return false;
        }
        let mut state = self.state.write();
        if state.epoch != ticket.epoch {
            self.stats.rejected_fills.fetch_add(1, Ordering::Relaxed);
            trace!(location = %ticket.location, "stale cache fill dropped");
            return false;
        }
        self.insert_locked(&mut state, ticket.location, data);
        true
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.used_bytes = 0;
        state.epoch += 1;
    }

    fn insert_locked(&self, state: &mut CacheState, location: ObjectLocation, data: Bytes) {
        let clock = self.tick();
        let size = data.len() as u64;

        if let Some(old) = state.entries.remove(&location) {
            state.used_bytes -= old.size();
        }

        // Evict until the new payload fits
        while state.used_bytes + size > self.max_bytes {
            let Some(evict_key) = Self::find_lru_entry(&state.entries) else {
                break;
            };
            if let Some(evicted) = state.entries.remove(&evict_key) {
                state.used_bytes -= evicted.size();
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        state.used_bytes += size;
        state.entries.insert(location, CacheEntry::new(data, clock));
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Find the least recently used entry key
    fn find_lru_entry(entries: &HashMap<ObjectLocation, CacheEntry>) -> Option<ObjectLocation> {
        entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone())
    }
}
