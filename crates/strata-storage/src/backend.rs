//! Backend cluster driver contract
//!
//! One driver per cluster identity. The core only ever talks to backends
//! through [`ClusterBackend`]; the wire protocol behind it is the driver's
//! business.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use strata_common::{ClusterId, Error, Locator, ObjectLocation, PoolName};
use thiserror::Error;

/// Errors reported by a backend driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("locator not found: {0}")]
    NotFound(Locator),

    #[error("pool not found: {0}")]
    PoolNotFound(PoolName),

    #[error("range {offset}+{length} outside object of {size} bytes")]
    InvalidRange { offset: u64, length: u64, size: u64 },

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend call timed out")]
    Timeout,
}

impl BackendError {
    /// Convert into the common error for a call against one object
    #[must_use]
    pub fn for_location(self, location: &ObjectLocation) -> Error {
        match self {
            Self::NotFound(_) => Error::ObjectNotFound {
                location: location.clone(),
            },
            other => other.for_cluster(&location.cluster),
        }
    }

    /// Convert into the common error for a call against a cluster
    #[must_use]
    pub fn for_cluster(self, cluster: &ClusterId) -> Error {
        match self {
            Self::Timeout => Error::Timeout,
            Self::InvalidRange { .. } => Error::invalid_argument(self.to_string()),
            other => Error::backend_unavailable(cluster.clone(), other.to_string()),
        }
    }
}

/// Result of a backend delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The backend released the bytes
    Deleted,
    /// Nothing was stored under the locator
    NotFound,
}

/// Driver for one backend storage cluster.
///
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Store a payload in a pool and return the backend's locator for it
    async fn write(&self, pool: &PoolName, payload: Bytes) -> Result<Locator, BackendError>;

    /// Read `length` bytes (or through the end when `None`) starting at
    /// `offset`
    async fn read(
        &self,
        pool: &PoolName,
        locator: &Locator,
        offset: u64,
        length: Option<u64>,
    ) -> Result<Bytes, BackendError>;

    /// Release the bytes behind a locator
    async fn delete(&self, pool: &PoolName, locator: &Locator) -> Result<DeleteOutcome, BackendError>;
}

/// Drivers keyed by cluster identity
#[derive(Default)]
pub struct BackendTable {
    drivers: DashMap<ClusterId, Arc<dyn ClusterBackend>>,
}

impl BackendTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the driver for a cluster
    pub fn register(&self, cluster: ClusterId, driver: Arc<dyn ClusterBackend>) {
        self.drivers.insert(cluster, driver);
    }

    /// Remove the driver for a cluster
    pub fn remove(&self, cluster: &ClusterId) -> Option<Arc<dyn ClusterBackend>> {
        self.drivers.remove(cluster).map(|(_, driver)| driver)
    }

    /// Driver for a cluster
    #[must_use]
    pub fn get(&self, cluster: &ClusterId) -> Option<Arc<dyn ClusterBackend>> {
        self.drivers.get(cluster).map(|d| Arc::clone(d.value()))
    }

    /// Driver for a cluster, or `UnknownCluster`
    pub fn require(&self, cluster: &ClusterId) -> strata_common::Result<Arc<dyn ClusterBackend>> {
        self.get(cluster)
            .ok_or_else(|| Error::UnknownCluster(cluster.clone()))
    }

    #[must_use]
    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.drivers.iter().map(|e| e.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
