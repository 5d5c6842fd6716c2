//! Data plane
//!
//! The path a gateway request takes through the core: place a write, push
//! the payload to the chosen backend, serve reads through the cache, and
//! hand superseded generations to the recycler.

use bytes::Bytes;
use std::sync::Arc;
use strata_common::{Config, Error, ObjectLocation, Result};
use strata_placement::{ClusterRegistry, PlacementRequest, PlacementSelector};
use strata_recycle::Recycler;
use strata_storage::{BackendTable, DataCache, slice_range};
use tracing::debug;

/// Placement, backend I/O, caching and recycling behind one handle
pub struct DataPlane {
    registry: Arc<ClusterRegistry>,
    selector: PlacementSelector,
    cache: DataCache,
    backends: Arc<BackendTable>,
    recycler: Arc<Recycler>,
}

impl DataPlane {
    #[must_use]
    pub const fn new(
        registry: Arc<ClusterRegistry>,
        selector: PlacementSelector,
        cache: DataCache,
        backends: Arc<BackendTable>,
        recycler: Arc<Recycler>,
    ) -> Self {
        Self {
            registry,
            selector,
            cache,
            backends,
            recycler,
        }
    }

    /// Wire every component from configuration. The recycler still has to be
    /// started by the caller.
    #[must_use]
    pub fn from_config(
        config: &Config,
        registry: Arc<ClusterRegistry>,
        backends: Arc<BackendTable>,
    ) -> Self {
        let selector =
            PlacementSelector::new(Arc::clone(&registry), config.placement.small_object_threshold);
        let cache = DataCache::from_config(&config.cache);
        let recycler = Recycler::new(
            config.recycle.clone(),
            Arc::clone(&registry),
            Arc::clone(&backends),
        );
        Self::new(registry, selector, cache, backends, recycler)
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<ClusterRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn selector(&self) -> &PlacementSelector {
        &self.selector
    }

    #[must_use]
    pub const fn cache(&self) -> &DataCache {
        &self.cache
    }

    #[must_use]
    pub const fn backends(&self) -> &Arc<BackendTable> {
        &self.backends
    }

    #[must_use]
    pub const fn recycler(&self) -> &Arc<Recycler> {
        &self.recycler
    }

    /// Place and store a new object generation.
    ///
    /// A backend failure after placement is returned as is; the write is
    /// never re-placed on another cluster.
    pub async fn write(&self, request: &PlacementRequest, payload: Bytes) -> Result<ObjectLocation> {
        if payload.len() as u64 != request.size {
            return Err(Error::invalid_argument(format!(
                "payload is {} bytes but request declares {}",
                payload.len(),
                request.size
            )));
        }

        let placement = self.selector.place(request)?;
        let driver = self.backends.require(&placement.cluster)?;
        let locator = driver
            .write(&placement.pool, payload)
            .await
            .map_err(|e| e.for_cluster(&placement.cluster))?;

        let location = ObjectLocation {
            cluster: placement.cluster,
            pool: placement.pool,
            locator,
        };
        debug!(
            bucket = %request.bucket,
            key = %request.key,
            %location,
            "object written"
        );
        Ok(location)
    }

    /// Read `length` bytes (or through the end) at `offset`.
    ///
    /// Cached payloads serve any range. On a miss only whole-object reads
    /// fill the cache.
    pub async fn read(
        &self,
        location: &ObjectLocation,
        offset: u64,
        length: Option<u64>,
    ) -> Result<Bytes> {
        if let Some(data) = self.cache.get(location) {
            return slice_range(&data, offset, length).map_err(|e| e.for_location(location));
        }

        let driver = self.backends.require(&location.cluster)?;
        let whole_object = offset == 0 && length.is_none();
        if !whole_object || !self.cache.is_enabled() {
            return driver
                .read(&location.pool, &location.locator, offset, length)
                .await
                .map_err(|e| e.for_location(location));
        }

        let ticket = self.cache.begin_fill(location);
        let data = driver
            .read(&location.pool, &location.locator, 0, None)
            .await
            .map_err(|e| e.for_location(location))?;
        self.cache.complete_fill(ticket, data.clone());
        Ok(data)
    }

    /// Drop a location from the cache. Call after the backend mutation is
    /// durable and before acknowledging it.
    pub fn invalidate(&self, location: &ObjectLocation) -> bool {
        self.cache.invalidate(location)
    }

    /// Retire a generation metadata no longer references: invalidate it and
    /// schedule its storage for reclaim.
    ///
    /// Call only after the metadata commit that drops the reference is
    /// durable. For an overwrite that means `write` the new generation,
    /// commit its location, then retire the previous one; a failed commit
    /// must leave the previous generation alone.
    pub fn retire(&self, location: ObjectLocation) -> bool {
        self.cache.invalidate(&location);
        let accepted = self.recycler.enqueue(location.clone());
        if !accepted {
            debug!(%location, "retired location already scheduled or recycler stopped");
        }
        accepted
    }
}
