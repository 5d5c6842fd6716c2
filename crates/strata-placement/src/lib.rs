//! Strata Placement - cluster registry and weighted placement
//!
//! This crate keeps the in-memory view of backend storage clusters and
//! decides which (cluster, pool) pair receives each object write.
//!
//! # Components
//!
//! ## Cluster Registry
//! Immutable [`RegistrySnapshot`]s published by a single refresher that
//! polls a [`MetadataSource`]. Readers never wait on metadata I/O.
//!
//! ## Placement Selector
//! Filters live clusters by storage class, object type and capacity hint,
//! then draws one with probability proportional to its weight and picks the
//! pool for the object's size regime.
//!
//! # Example
//! ```ignore
//! use strata_placement::{ClusterRegistry, PlacementRequest, PlacementSelector};
//!
//! let registry = Arc::new(ClusterRegistry::with_clusters(clusters)?);
//! let selector = PlacementSelector::new(registry, 128 * 1024);
//! let placement = selector.place(&PlacementRequest::new("photos", "cat.jpg", 4096))?;
//! ```

pub mod cluster;
pub mod registry;
pub mod selector;

pub use cluster::{Cluster, ClusterDescriptor, InvalidCluster, PoolDescriptor, RegistrySnapshot};
pub use registry::{ClusterRegistry, MetadataSource, StaticClusterSource, run_refresher};
pub use selector::{Placement, PlacementRequest, PlacementSelector, PlacementStats};
