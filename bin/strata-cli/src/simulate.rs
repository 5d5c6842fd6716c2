//! In-memory end-to-end scenario
//!
//! Drives a [`DataPlane`] over in-memory drivers: writes, cached reads,
//! overwrites and the recycling they cause.

use anyhow::Result;
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use strata_common::{ClusterId, Config, ObjectLocation, PoolRegime, StorageClass};
use strata_engine::DataPlane;
use strata_placement::{ClusterDescriptor, ClusterRegistry, PlacementRequest, StaticClusterSource};
use strata_recycle::DeadLetter;
use strata_storage::{BackendTable, MemoryBackend};
use tokio::sync::watch;
use tracing::info;

/// Scenario knobs
#[derive(Debug, Clone)]
pub struct Scenario {
    pub objects: usize,
    pub object_size: usize,
    pub reads_per_object: usize,
    /// Delete calls to fail on every cluster before they start succeeding
    pub failing_deletes: u32,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub writes: usize,
    pub overwrites: usize,
    pub reads: usize,
    pub placements: BTreeMap<String, u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_ratio: f64,
    pub cache_bytes: u64,
    pub reclaimed: u64,
    pub failed_attempts: u64,
    pub dead_letters: Vec<DeadLetter>,
    /// Objects left on each backend after recycling settles
    pub stored_objects: BTreeMap<String, usize>,
}

/// Topology used when the config file lists no clusters
pub fn demo_clusters() -> Vec<ClusterDescriptor> {
    vec![
        ClusterDescriptor::new("ceph-a", 2)
            .with_pool("rabbit", StorageClass::Standard, PoolRegime::Small)
            .with_pool("tiger", StorageClass::Standard, PoolRegime::Large),
        ClusterDescriptor::new("ceph-b", 1)
            .with_pool("rabbit", StorageClass::Standard, PoolRegime::Small)
            .with_pool("tiger", StorageClass::Standard, PoolRegime::Large)
            .with_pool("cold", StorageClass::Glacier, PoolRegime::Large),
    ]
}

pub async fn run(config: &Config, clusters: Vec<ClusterDescriptor>, scenario: &Scenario) -> Result<Report> {
    let registry = Arc::new(ClusterRegistry::new());
    registry.refresh(&StaticClusterSource::new(clusters)).await?;
    let backends = Arc::new(BackendTable::new());
    let mut drivers: BTreeMap<ClusterId, Arc<MemoryBackend>> = BTreeMap::new();
    for cluster in registry.snapshot().clusters() {
        let driver = Arc::new(MemoryBackend::new());
        driver.fail_next_deletes(scenario.failing_deletes);
        backends.register(cluster.id().clone(), driver.clone());
        drivers.insert(cluster.id().clone(), driver);
    }

    let plane = DataPlane::from_config(config, registry, backends);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = plane.recycler().start(shutdown_rx);

    info!(objects = scenario.objects, size = scenario.object_size, "simulation started");

    // Stands in for the metadata store: object key to its current location
    let mut index: BTreeMap<String, ObjectLocation> = BTreeMap::new();
    for i in 0..scenario.objects {
        let request = PlacementRequest::new("sim", format!("object-{i}"), scenario.object_size as u64);
        let payload = Bytes::from(vec![(i % 251) as u8; scenario.object_size]);
        let location = plane.write(&request, payload).await?;
        index.insert(request.key, location);
    }
    let writes = index.len();

    let mut reads = 0;
    for location in index.values() {
        for _ in 0..scenario.reads_per_object {
            plane.read(location, 0, None).await?;
            reads += 1;
        }
    }

    // Overwrite: write the new generation, commit it, then retire the old one
    let mut overwrites = 0;
    for (key, current) in &mut index {
        let request = PlacementRequest::new("sim", key.clone(), scenario.object_size as u64);
        let payload = Bytes::from(vec![0xEE; scenario.object_size]);
        let location = plane.write(&request, payload).await?;
        let previous = std::mem::replace(current, location);
        plane.retire(previous);
        overwrites += 1;
    }

    plane.recycler().wait_idle().await;
    shutdown_tx.send(true)?;
    dispatcher.await?;

    let cache = plane.cache().stats();
    let recycler = plane.recycler().stats();
    let report = Report {
        writes,
        overwrites,
        reads,
        placements: plane
            .selector()
            .stats()
            .placements_by_cluster()
            .into_iter()
            .map(|(id, count)| (id.to_string(), count))
            .collect(),
        cache_hits: cache.hits.load(Ordering::Relaxed),
        cache_misses: cache.misses.load(Ordering::Relaxed),
        cache_hit_ratio: cache.hit_ratio(),
        cache_bytes: plane.cache().used_bytes(),
        reclaimed: recycler.reclaimed.load(Ordering::Relaxed),
        failed_attempts: recycler.failed_attempts.load(Ordering::Relaxed),
        dead_letters: plane.recycler().dead_letters(),
        stored_objects: drivers
            .iter()
            .map(|(id, driver)| (id.to_string(), driver.len()))
            .collect(),
    };
    info!(reclaimed = report.reclaimed, "simulation finished");
    Ok(report)
}
