//! Cluster registry
//!
//! Holds the current [`RegistrySnapshot`] behind a single pointer. Readers
//! clone the `Arc` and never wait on metadata I/O; the refresher builds a
//! complete new snapshot off to the side and swaps it in whole.

use crate::cluster::{ClusterDescriptor, RegistrySnapshot};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use strata_common::{Error, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Source of truth for backend cluster definitions
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch every cluster definition (`ListClusters`)
    async fn list_clusters(&self) -> Result<Vec<ClusterDescriptor>>;
}

/// Metadata source backed by an in-process list.
///
/// Used for static deployments and tests; the list can be replaced and the
/// source can be marked unreachable to exercise refresh failures.
#[derive(Default)]
pub struct StaticClusterSource {
    clusters: RwLock<Vec<ClusterDescriptor>>,
    unreachable: AtomicBool,
}

impl StaticClusterSource {
    #[must_use]
    pub fn new(clusters: Vec<ClusterDescriptor>) -> Self {
        Self {
            clusters: RwLock::new(clusters),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Replace the cluster list returned by later calls
    pub fn set_clusters(&self, clusters: Vec<ClusterDescriptor>) {
        *self.clusters.write() = clusters;
    }

    /// Make `list_clusters` fail until reset
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }
}

#[async_trait]
impl MetadataSource for StaticClusterSource {
    async fn list_clusters(&self) -> Result<Vec<ClusterDescriptor>> {
        if self.unreachable.load(Ordering::Relaxed) {
            return Err(Error::RegistryRefreshFailed(
                "metadata source unreachable".to_string(),
            ));
        }
        Ok(self.clusters.read().clone())
    }
}

/// In-memory registry of backend clusters
pub struct ClusterRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    refresh_failures: AtomicU64,
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterRegistry {
    /// Create a registry with an empty, version 0 snapshot
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            refresh_failures: AtomicU64::new(0),
        }
    }

    /// Create a registry seeded with a fixed cluster list
    pub fn with_clusters(descriptors: Vec<ClusterDescriptor>) -> Result<Self> {
        let registry = Self::new();
        registry.install(descriptors)?;
        Ok(registry)
    }

    /// Current snapshot
    ///
    /// The returned view does not change; later refreshes publish new
    /// snapshots instead.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Version of the current snapshot
    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.read().version()
    }

    /// Number of refreshes that failed since startup
    #[must_use]
    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }

    /// Validate descriptors and publish them as the next snapshot
    pub fn install(&self, descriptors: Vec<ClusterDescriptor>) -> Result<u64> {
        let mut snapshot = RegistrySnapshot::from_descriptors(0, descriptors)
            .map_err(|e| Error::RegistryRefreshFailed(e.to_string()))?;

        let mut current = self.current.write();
        let version = current.version() + 1;
        snapshot.set_version(version);
        *current = Arc::new(snapshot);
        Ok(version)
    }

    /// Pull the cluster list from metadata and replace the snapshot.
    ///
    /// On failure the previous snapshot stays in effect.
    pub async fn refresh(&self, source: &dyn MetadataSource) -> Result<u64> {
        let result = match source.list_clusters().await {
            Ok(descriptors) => self.install(descriptors),
            Err(Error::RegistryRefreshFailed(msg)) => Err(Error::RegistryRefreshFailed(msg)),
            Err(e) => Err(Error::RegistryRefreshFailed(e.to_string())),
        };

        match &result {
            Ok(version) => {
                let snapshot = self.snapshot();
                debug!(
                    version,
                    clusters = snapshot.len(),
                    live = snapshot.live_clusters().count(),
                    "cluster registry refreshed"
                );
            }
            Err(e) => {
                self.refresh_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    version = self.version(),
                    "cluster registry refresh failed, keeping previous snapshot"
                );
            }
        }
        result
    }
}

/// Long-running background task: refresh the registry every `interval`
/// until `shutdown` flips to true (or its sender is dropped).
pub async fn run_refresher(
    registry: Arc<ClusterRegistry>,
    source: Arc<dyn MetadataSource>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "cluster registry refresher started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are logged and counted inside refresh
                let _ = registry.refresh(source.as_ref()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("cluster registry refresher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::{ClusterId, ClusterStatus, PoolRegime, StorageClass};

    fn cluster(id: &str, weight: u32) -> ClusterDescriptor {
        ClusterDescriptor::new(id, weight).with_pool("tiger", StorageClass::Standard, PoolRegime::Large)
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let registry = ClusterRegistry::new();
        let source = StaticClusterSource::new(vec![cluster("a", 1)]);

        assert_eq!(registry.version(), 0);
        assert_eq!(registry.refresh(&source).await.unwrap(), 1);
        assert_eq!(registry.snapshot().len(), 1);

        source.set_clusters(vec![cluster("a", 1), cluster("b", 2)]);
        assert_eq!(registry.refresh(&source).await.unwrap(), 2);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_old_snapshot_is_not_mutated() {
        let registry = ClusterRegistry::with_clusters(vec![cluster("a", 1)]).unwrap();
        let before = registry.snapshot();

        let source = StaticClusterSource::new(vec![
            cluster("a", 5).with_status(ClusterStatus::Dead),
            cluster("b", 1),
        ]);
        registry.refresh(&source).await.unwrap();

        let a = before.get(&ClusterId::new("a")).unwrap();
        assert_eq!(a.weight(), 1);
        assert!(a.is_live());
        assert_eq!(before.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_source_keeps_previous_snapshot() {
        let registry = ClusterRegistry::new();
        let source = StaticClusterSource::new(vec![cluster("a", 1)]);
        registry.refresh(&source).await.unwrap();

        source.set_unreachable(true);
        let err = registry.refresh(&source).await.unwrap_err();
        assert!(matches!(err, Error::RegistryRefreshFailed(_)));
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.snapshot().len(), 1);
        assert_eq!(registry.refresh_failures(), 1);
    }

    #[tokio::test]
    async fn test_invalid_listing_keeps_previous_snapshot() {
        let registry = ClusterRegistry::with_clusters(vec![cluster("a", 1)]).unwrap();
        let source = StaticClusterSource::new(vec![cluster("b", 1), cluster("b", 1)]);

        assert!(registry.refresh(&source).await.is_err());
        assert!(registry.snapshot().get(&ClusterId::new("a")).is_some());
        assert_eq!(registry.version(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_picks_up_changes_and_stops() {
        let registry = Arc::new(ClusterRegistry::new());
        let source = Arc::new(StaticClusterSource::new(vec![cluster("a", 1)]));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_refresher(
            Arc::clone(&registry),
            source.clone(),
            Duration::from_secs(30),
            rx,
        ));

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.snapshot().len(), 1);

        source.set_clusters(vec![cluster("a", 1), cluster("b", 1)]);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(registry.snapshot().len(), 2);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
