//! Backend cluster representation
//!
//! `ClusterDescriptor` is the shape the metadata store hands out;
//! `Cluster` is the validated, immutable form placed into registry
//! snapshots.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use strata_common::{ClusterId, ClusterStatus, ObjectType, PoolName, PoolRegime, StorageClass};
use thiserror::Error;

/// Pool as described by the metadata store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    /// Pool name, unique within its cluster
    pub name: PoolName,
    /// Storage class the pool serves
    pub storage_class: StorageClass,
    /// Object-size regime the pool serves
    pub regime: PoolRegime,
}

impl PoolDescriptor {
    #[must_use]
    pub fn new(name: impl Into<PoolName>, storage_class: StorageClass, regime: PoolRegime) -> Self {
        Self {
            name: name.into(),
            storage_class,
            regime,
        }
    }
}

/// Cluster as described by the metadata store (`ListClusters`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    /// Cluster identity
    pub id: ClusterId,
    /// Share of write traffic (0 = take no new writes)
    #[serde(default)]
    pub weight: u32,
    /// Pools, in preference order
    #[serde(default)]
    pub pools: Vec<PoolDescriptor>,
    /// Storage classes the cluster accepts
    #[serde(default)]
    pub storage_classes: Vec<StorageClass>,
    /// Free capacity in bytes, when the metadata store knows it
    #[serde(default)]
    pub capacity_hint: Option<u64>,
    /// Liveness hint
    #[serde(default)]
    pub status: ClusterStatus,
}

impl ClusterDescriptor {
    /// Create a live descriptor with no pools or classes
    #[must_use]
    pub fn new(id: impl Into<ClusterId>, weight: u32) -> Self {
        Self {
            id: id.into(),
            weight,
            pools: Vec::new(),
            storage_classes: Vec::new(),
            capacity_hint: None,
            status: ClusterStatus::Live,
        }
    }

    /// Add a pool and advertise its storage class
    #[must_use]
    pub fn with_pool(mut self, name: &str, storage_class: StorageClass, regime: PoolRegime) -> Self {
        if !self.storage_classes.contains(&storage_class) {
            self.storage_classes.push(storage_class);
        }
        self.pools.push(PoolDescriptor::new(name, storage_class, regime));
        self
    }

    /// Advertise a storage class without adding a pool
    #[must_use]
    pub fn with_storage_class(mut self, storage_class: StorageClass) -> Self {
        if !self.storage_classes.contains(&storage_class) {
            self.storage_classes.push(storage_class);
        }
        self
    }

    #[must_use]
    pub const fn with_capacity_hint(mut self, free_bytes: u64) -> Self {
        self.capacity_hint = Some(free_bytes);
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: ClusterStatus) -> Self {
        self.status = status;
        self
    }
}

/// Reasons a descriptor cannot enter a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCluster {
    #[error("cluster identity is empty")]
    EmptyId,
    #[error("cluster {0} is listed more than once")]
    DuplicateCluster(ClusterId),
    #[error("cluster {cluster} has a pool with an empty name")]
    EmptyPoolName { cluster: ClusterId },
    #[error("cluster {cluster} lists pool {pool} more than once")]
    DuplicatePool { cluster: ClusterId, pool: PoolName },
    #[error("cluster {cluster} pool {pool} serves {storage_class}, which the cluster does not advertise")]
    UnadvertisedPoolClass {
        cluster: ClusterId,
        pool: PoolName,
        storage_class: StorageClass,
    },
}

/// Validated, immutable cluster entry of a registry snapshot
#[derive(Clone, Debug)]
pub struct Cluster {
    id: ClusterId,
    weight: u32,
    pools: Vec<PoolDescriptor>,
    storage_classes: BTreeSet<StorageClass>,
    capacity_hint: Option<u64>,
    status: ClusterStatus,
}

impl Cluster {
    /// Validate a descriptor
    pub fn from_descriptor(desc: ClusterDescriptor) -> Result<Self, InvalidCluster> {
        if desc.id.as_str().is_empty() {
            return Err(InvalidCluster::EmptyId);
        }
        let storage_classes: BTreeSet<StorageClass> = desc.storage_classes.into_iter().collect();

        let mut names = HashSet::new();
        for pool in &desc.pools {
            if pool.name.as_str().is_empty() {
                return Err(InvalidCluster::EmptyPoolName { cluster: desc.id });
            }
            if !names.insert(pool.name.clone()) {
                return Err(InvalidCluster::DuplicatePool {
                    cluster: desc.id,
                    pool: pool.name.clone(),
                });
            }
            if !storage_classes.contains(&pool.storage_class) {
                return Err(InvalidCluster::UnadvertisedPoolClass {
                    cluster: desc.id,
                    pool: pool.name.clone(),
                    storage_class: pool.storage_class,
                });
            }
        }

        Ok(Self {
            id: desc.id,
            weight: desc.weight,
            pools: desc.pools,
            storage_classes,
            capacity_hint: desc.capacity_hint,
            status: desc.status,
        })
    }

    #[must_use]
    pub const fn id(&self) -> &ClusterId {
        &self.id
    }

    #[must_use]
    pub const fn weight(&self) -> u32 {
        self.weight
    }

    #[must_use]
    pub fn pools(&self) -> &[PoolDescriptor] {
        &self.pools
    }

    #[must_use]
    pub const fn capacity_hint(&self) -> Option<u64> {
        self.capacity_hint
    }

    #[must_use]
    pub const fn status(&self) -> ClusterStatus {
        self.status
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status == ClusterStatus::Live
    }

    #[must_use]
    pub fn supports_class(&self, storage_class: StorageClass) -> bool {
        self.storage_classes.contains(&storage_class)
    }

    pub fn storage_classes(&self) -> impl Iterator<Item = StorageClass> + '_ {
        self.storage_classes.iter().copied()
    }

    /// Whether a pool of `storage_class` can hold objects of this type.
    ///
    /// Normal objects fit any pool; appendable objects need a large pool.
    /// A cluster that advertises the class without any pool for it is judged
    /// on all of its pools instead, so placement can report it as an
    /// integrity fault rather than silently dropping it.
    #[must_use]
    pub fn accepts_object_type(&self, storage_class: StorageClass, object_type: ObjectType) -> bool {
        let in_class: Vec<&PoolDescriptor> = self
            .pools
            .iter()
            .filter(|p| p.storage_class == storage_class)
            .collect();
        let pools = if in_class.is_empty() {
            self.pools.iter().collect()
        } else {
            in_class
        };
        match object_type {
            ObjectType::Normal => !pools.is_empty(),
            ObjectType::Appendable => pools.iter().any(|p| p.regime == PoolRegime::Large),
        }
    }

    /// Whether the capacity hint (if any) leaves room for `size` bytes
    #[must_use]
    pub fn has_capacity_for(&self, size: u64) -> bool {
        self.capacity_hint.is_none_or(|free| free >= size)
    }

    /// Pool for a (class, regime) pair.
    ///
    /// Small objects fall back to a large pool of the same class when the
    /// cluster has no small pool for it.
    #[must_use]
    pub fn pool_for(&self, storage_class: StorageClass, regime: PoolRegime) -> Option<&PoolDescriptor> {
        let exact = |r: PoolRegime| {
            self.pools
                .iter()
                .find(|p| p.storage_class == storage_class && p.regime == r)
        };
        match regime {
            PoolRegime::Small => exact(PoolRegime::Small).or_else(|| exact(PoolRegime::Large)),
            PoolRegime::Large => exact(PoolRegime::Large),
        }
    }

    /// Whether this cluster owns a pool with the given name
    #[must_use]
    pub fn has_pool(&self, pool: &PoolName) -> bool {
        self.pools.iter().any(|p| &p.name == pool)
    }
}

/// Immutable view of every known cluster at one point in time
#[derive(Clone, Debug, Default)]
pub struct RegistrySnapshot {
    version: u64,
    clusters: Vec<Cluster>,
    index: HashMap<ClusterId, usize>,
}

impl RegistrySnapshot {
    /// Build a snapshot from metadata descriptors, rejecting the whole list
    /// if any entry is invalid
    pub fn from_descriptors(
        version: u64,
        descriptors: Vec<ClusterDescriptor>,
    ) -> Result<Self, InvalidCluster> {
        let mut clusters = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());
        for desc in descriptors {
            let cluster = Cluster::from_descriptor(desc)?;
            if index.contains_key(cluster.id()) {
                return Err(InvalidCluster::DuplicateCluster(cluster.id().clone()));
            }
            index.insert(cluster.id().clone(), clusters.len());
            clusters.push(cluster);
        }
        Ok(Self {
            version,
            clusters,
            index,
        })
    }

    /// Snapshot version (0 = never refreshed)
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    pub(crate) const fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// All clusters, live or dead, in metadata order
    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Clusters currently marked live
    pub fn live_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter().filter(|c| c.is_live())
    }

    /// Look up a cluster, live or dead
    #[must_use]
    pub fn get(&self, id: &ClusterId) -> Option<&Cluster> {
        self.index.get(id).map(|&i| &self.clusters[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
