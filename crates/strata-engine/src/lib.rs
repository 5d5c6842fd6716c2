//! Strata Engine - the data-plane facade
//!
//! [`DataPlane`] ties the cluster registry, placement selector, data cache,
//! backend drivers and recycler into the operations a gateway calls.

pub mod engine;

pub use engine::DataPlane;
