//! Weighted cluster and pool selection
//!
//! Every call reads the latest registry snapshot, filters it down to the
//! clusters that can take the write, and draws one of them with probability
//! proportional to its weight. Nothing is cached between calls, so weight
//! and liveness changes apply to the very next request.

use crate::cluster::{Cluster, RegistrySnapshot};
use crate::registry::ClusterRegistry;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_common::{
    ClusterId, Error, ObjectType, PoolName, PoolRegime, Result, StorageClass,
};
use tracing::{debug, error};

/// A logical write waiting for a physical home
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacementRequest {
    pub bucket: String,
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    pub storage_class: StorageClass,
    pub object_type: ObjectType,
}

impl PlacementRequest {
    /// A normal STANDARD object
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, size: u64) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
            storage_class: StorageClass::Standard,
            object_type: ObjectType::Normal,
        }
    }

    #[must_use]
    pub const fn with_storage_class(mut self, storage_class: StorageClass) -> Self {
        self.storage_class = storage_class;
        self
    }

    #[must_use]
    pub const fn with_object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }
}

/// Result of a placement decision
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub cluster: ClusterId,
    pub pool: PoolName,
    /// Regime the request mapped to (the pool may be a large-pool fallback)
    pub regime: PoolRegime,
    /// Registry snapshot the decision was made against
    pub snapshot_version: u64,
}

/// Placement statistics for monitoring
#[derive(Debug, Default)]
pub struct PlacementStats {
    /// Successful placements
    pub placements: AtomicU64,
    /// Requests rejected with no eligible cluster
    pub no_eligible: AtomicU64,
    /// Clusters skipped because they lacked a matching pool
    pub integrity_faults: AtomicU64,
    per_cluster: Mutex<HashMap<ClusterId, u64>>,
}

impl PlacementStats {
    /// Successful placements per cluster
    #[must_use]
    pub fn placements_by_cluster(&self) -> HashMap<ClusterId, u64> {
        self.per_cluster.lock().clone()
    }

    fn record(&self, cluster: &ClusterId) {
        self.placements.fetch_add(1, Ordering::Relaxed);
        *self.per_cluster.lock().entry(cluster.clone()).or_insert(0) += 1;
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.placements.store(0, Ordering::Relaxed);
        self.no_eligible.store(0, Ordering::Relaxed);
        self.integrity_faults.store(0, Ordering::Relaxed);
        self.per_cluster.lock().clear();
    }
}

/// Chooses the (cluster, pool) pair for each write
pub struct PlacementSelector {
    registry: Arc<ClusterRegistry>,
    small_object_threshold: u64,
    stats: PlacementStats,
}

impl PlacementSelector {
    /// Create a selector over a registry
    #[must_use]
    pub fn new(registry: Arc<ClusterRegistry>, small_object_threshold: u64) -> Self {
        Self {
            registry,
            small_object_threshold,
            stats: PlacementStats::default(),
        }
    }

    /// Get placement statistics
    pub const fn stats(&self) -> &PlacementStats {
        &self.stats
    }

    /// Registry this selector reads from
    pub const fn registry(&self) -> &Arc<ClusterRegistry> {
        &self.registry
    }

    /// Place a write using the thread-local RNG
    pub fn place(&self, request: &PlacementRequest) -> Result<Placement> {
        self.place_with_rng(request, &mut rand::thread_rng())
    }

    /// Place a write drawing randomness from `rng` (seed it for reproducible
    /// tests)
    pub fn place_with_rng<R: Rng + ?Sized>(
        &self,
        request: &PlacementRequest,
        rng: &mut R,
    ) -> Result<Placement> {
        let snapshot = self.registry.snapshot();
        let result = self.select(&snapshot, request, rng);

        match &result {
            Ok(placement) => {
                self.stats.record(&placement.cluster);
                debug!(
                    bucket = %request.bucket,
                    key = %request.key,
                    size = request.size,
                    cluster = %placement.cluster,
                    pool = %placement.pool,
                    "object placed"
                );
            }
            Err(Error::NoEligibleCluster { .. }) => {
                self.stats.no_eligible.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {}
        }
        result
    }

    fn select<R: Rng + ?Sized>(
        &self,
        snapshot: &RegistrySnapshot,
        request: &PlacementRequest,
        rng: &mut R,
    ) -> Result<Placement> {
        let regime =
            PoolRegime::for_object(request.object_type, request.size, self.small_object_threshold);

        let mut candidates: Vec<&Cluster> = snapshot
            .live_clusters()
            .filter(|c| c.weight() > 0)
            .filter(|c| c.supports_class(request.storage_class))
            .filter(|c| c.accepts_object_type(request.storage_class, request.object_type))
            .filter(|c| c.has_capacity_for(request.size))
            .collect();

        if candidates.is_empty() {
            return Err(Error::NoEligibleCluster {
                storage_class: request.storage_class,
                object_type: request.object_type,
            });
        }

        let mut faulty = Vec::new();
        while let Some(idx) = choose_weighted(&candidates, rng) {
            let cluster = candidates[idx];
            if let Some(pool) = cluster.pool_for(request.storage_class, regime) {
                return Ok(Placement {
                    cluster: cluster.id().clone(),
                    pool: pool.name.clone(),
                    regime,
                    snapshot_version: snapshot.version(),
                });
            }

            self.stats.integrity_faults.fetch_add(1, Ordering::Relaxed);
            error!(
                cluster = %cluster.id(),
                storage_class = %request.storage_class,
                %regime,
                "cluster advertises storage class but has no matching pool, skipping"
            );
            faulty.push(cluster.id().clone());
            candidates.swap_remove(idx);
        }

        Err(Error::ConfigurationIntegrityFault {
            clusters: faulty,
            storage_class: request.storage_class,
            regime,
        })
    }
}

/// Draw an index with probability proportional to cluster weight.
///
/// Returns `None` when the total weight is zero.
fn choose_weighted<R: Rng + ?Sized>(candidates: &[&Cluster], rng: &mut R) -> Option<usize> {
    let total: u64 = candidates.iter().map(|c| u64::from(c.weight())).sum();
    if total == 0 {
        return None;
    }

    let mut point = rng.gen_range(0..total);
    for (i, cluster) in candidates.iter().enumerate() {
        let weight = u64::from(cluster.weight());
        if point < weight {
            return Some(i);
        }
        point -= weight;
    }
    None
}
