//! Strata Common - Shared types and utilities
//!
//! This crate provides the identifiers, error definitions and configuration
//! shared by the placement, storage, recycle and engine crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
