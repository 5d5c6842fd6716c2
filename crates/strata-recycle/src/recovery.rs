//! Restart recovery
//!
//! The recycle queue lives in memory only. After a restart the recycler
//! re-derives its work from metadata's view of unreferenced generations.

use async_trait::async_trait;
use parking_lot::RwLock;
use strata_common::{ObjectLocation, Result};

/// Metadata view of object generations that nothing references any more
#[async_trait]
pub trait GarbageSource: Send + Sync {
    async fn list_unreferenced(&self) -> Result<Vec<ObjectLocation>>;
}

/// Garbage source backed by an in-process list
#[derive(Default)]
pub struct StaticGarbageSource {
    locations: RwLock<Vec<ObjectLocation>>,
}

impl StaticGarbageSource {
    #[must_use]
    pub fn new(locations: Vec<ObjectLocation>) -> Self {
        Self {
            locations: RwLock::new(locations),
        }
    }

    pub fn push(&self, location: ObjectLocation) {
        self.locations.write().push(location);
    }
}

#[async_trait]
impl GarbageSource for StaticGarbageSource {
    async fn list_unreferenced(&self) -> Result<Vec<ObjectLocation>> {
        Ok(self.locations.read().clone())
    }
}
