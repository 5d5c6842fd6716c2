//! Strata Storage - backend drivers and the read-side data cache
//!
//! - [`ClusterBackend`]: the contract every backend cluster driver
//!   implements, plus a [`BackendTable`] keyed by cluster identity
//! - [`MemoryBackend`]: in-process driver with fault injection
//! - [`DataCache`]: size-bounded LRU payload cache with invalidation

pub mod backend;
pub mod cache;
pub mod memory;

pub use backend::{BackendError, BackendTable, ClusterBackend, DeleteOutcome};
pub use cache::{CacheStats, DataCache, FillTicket};
pub use memory::{MemoryBackend, MemoryBackendStats, slice_range};
