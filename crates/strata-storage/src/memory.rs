//! In-memory backend driver
//!
//! Stores payloads in a `HashMap`. Useful for tests, simulations and
//! single-process deployments. Faults can be injected to exercise the
//! read/write error paths and the recycler's retry logic.

use crate::backend::{BackendError, ClusterBackend, DeleteOutcome};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use strata_common::{Locator, PoolName};
use uuid::Uuid;

/// Call counters for an in-memory backend
#[derive(Debug, Default)]
pub struct MemoryBackendStats {
    pub writes: AtomicU64,
    pub reads: AtomicU64,
    /// Delete calls received, including failed ones
    pub deletes: AtomicU64,
    /// Highest number of delete calls observed running at once
    pub max_concurrent_deletes: AtomicU64,
    in_flight_deletes: AtomicU64,
}

/// In-memory [`ClusterBackend`]
#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<(PoolName, Locator), Bytes>>,
    /// Pools the backend knows; empty means "accept any pool"
    pools: HashSet<PoolName>,
    offline: AtomicBool,
    failing_deletes: AtomicU32,
    delete_delay: Mutex<Option<Duration>>,
    stats: MemoryBackendStats,
}

impl MemoryBackend {
    /// Create a backend that accepts any pool name
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that only knows the given pools
    #[must_use]
    pub fn with_pools<I, P>(pools: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PoolName>,
    {
        Self {
            pools: pools.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Make every call fail with `Unavailable` until reset
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Fail the next `count` delete calls
    pub fn fail_next_deletes(&self, count: u32) {
        self.failing_deletes.store(count, Ordering::Relaxed);
    }

    /// Delay every delete call (for timeout and concurrency tests)
    pub fn set_delete_delay(&self, delay: Option<Duration>) {
        *self.delete_delay.lock() = delay;
    }

    /// Store a payload under a caller-chosen locator
    pub fn insert(&self, pool: impl Into<PoolName>, locator: impl Into<Locator>, payload: Bytes) {
        self.objects.write().insert((pool.into(), locator.into()), payload);
    }

    #[must_use]
    pub fn contains(&self, pool: &PoolName, locator: &Locator) -> bool {
        self.objects.read().contains_key(&(pool.clone(), locator.clone()))
    }

    /// Number of stored objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub const fn stats(&self) -> &MemoryBackendStats {
        &self.stats
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(BackendError::Unavailable("backend offline".to_string()));
        }
        Ok(())
    }

    fn check_pool(&self, pool: &PoolName) -> Result<(), BackendError> {
        if !self.pools.is_empty() && !self.pools.contains(pool) {
            return Err(BackendError::PoolNotFound(pool.clone()));
        }
        Ok(())
    }

    fn take_injected_delete_failure(&self) -> bool {
        self.failing_deletes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ClusterBackend for MemoryBackend {
    async fn write(&self, pool: &PoolName, payload: Bytes) -> Result<Locator, BackendError> {
        self.check_online()?;
        self.check_pool(pool)?;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        let locator = Locator::new(Uuid::new_v4().to_string());
        self.objects
            .write()
            .insert((pool.clone(), locator.clone()), payload);
        Ok(locator)
    }

    async fn read(
        &self,
        pool: &PoolName,
        locator: &Locator,
        offset: u64,
        length: Option<u64>,
    ) -> Result<Bytes, BackendError> {
        self.check_online()?;
        self.check_pool(pool)?;
        self.stats.reads.fetch_add(1, Ordering::Relaxed);

        let data = self
            .objects
            .read()
            .get(&(pool.clone(), locator.clone()))
            .cloned()
            .ok_or_else(|| BackendError::NotFound(locator.clone()))?;
        slice_range(&data, offset, length)
    }

    async fn delete(&self, pool: &PoolName, locator: &Locator) -> Result<DeleteOutcome, BackendError> {
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        let running = self.stats.in_flight_deletes.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats
            .max_concurrent_deletes
            .fetch_max(running, Ordering::SeqCst);

        let delay = *self.delete_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self.check_online().and_then(|()| {
            if self.take_injected_delete_failure() {
                return Err(BackendError::Unavailable("injected delete failure".to_string()));
            }
            self.check_pool(pool)?;
            let removed = self
                .objects
                .write()
                .remove(&(pool.clone(), locator.clone()));
            Ok(if removed.is_some() {
                DeleteOutcome::Deleted
            } else {
                DeleteOutcome::NotFound
            })
        });

        self.stats.in_flight_deletes.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Cut `[offset, offset + length)` out of a payload
pub fn slice_range(data: &Bytes, offset: u64, length: Option<u64>) -> Result<Bytes, BackendError> {
    let size = data.len() as u64;
    let end = match length {
        Some(length) => offset.checked_add(length),
        None => Some(size),
    };
    match end {
        Some(end) if offset <= size && end <= size && offset <= end => {
            #[allow(clippy::cast_possible_truncation)]
            Ok(data.slice(offset as usize..end as usize))
        }
        _ => Err(BackendError::InvalidRange {
            offset,
            length: length.unwrap_or(0),
            size,
        }),
    }
}
