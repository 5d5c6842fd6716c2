//! Core type definitions for Strata
//!
//! Identifiers for clusters, pools and backend locators, plus the service
//! tiers and object kinds that drive placement.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a backend storage cluster (opaque to the core)
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    /// Create a new cluster identity
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identity as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClusterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Debug for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClusterId({:?})", self.0)
    }
}

/// Name of a pool inside a cluster
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
#[serde(transparent)]
pub struct PoolName(String);

impl PoolName {
    /// Create a new pool name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the pool name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PoolName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Debug for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolName({:?})", self.0)
    }
}

/// Backend-assigned handle for an object's bytes within a pool
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Wrap a backend locator
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Get the locator as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Locator {
    fn from(locator: &str) -> Self {
        Self(locator.to_string())
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({:?})", self.0)
    }
}

/// Fully qualified physical location of one object generation.
///
/// This is the key of the data cache and the identity of a recycle task.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub cluster: ClusterId,
    pub pool: PoolName,
    pub locator: Locator,
}

impl ObjectLocation {
    #[must_use]
    pub fn new(
        cluster: impl Into<ClusterId>,
        pool: impl Into<PoolName>,
        locator: impl Into<Locator>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            pool: pool.into(),
            locator: locator.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cluster, self.pool, self.locator)
    }
}

/// Service tier of an object (S3 storage class)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    #[default]
    #[serde(rename = "STANDARD")]
    Standard,
    #[serde(rename = "STANDARD_IA")]
    StandardIa,
    #[serde(rename = "GLACIER")]
    Glacier,
}

impl StorageClass {
    /// All supported storage classes
    pub const ALL: [Self; 3] = [Self::Standard, Self::StandardIa, Self::Glacier];

    /// S3 wire name of the class
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::StandardIa => "STANDARD_IA",
            Self::Glacier => "GLACIER",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown storage class
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown storage class: {0}")]
pub struct UnknownStorageClass(pub String);

impl FromStr for StorageClass {
    type Err = UnknownStorageClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "STANDARD" => Ok(Self::Standard),
            "STANDARD_IA" => Ok(Self::StandardIa),
            "GLACIER" => Ok(Self::Glacier),
            _ => Err(UnknownStorageClass(s.to_string())),
        }
    }
}

/// Kind of object being written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    /// Written once in full
    #[default]
    Normal,
    /// Grown in place by append requests
    Appendable,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Appendable => f.write_str("appendable"),
        }
    }
}

/// Error returned when parsing an unknown object type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown object type: {0}")]
pub struct UnknownObjectType(pub String);

impl FromStr for ObjectType {
    type Err = UnknownObjectType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "appendable" | "append" => Ok(Self::Appendable),
            _ => Err(UnknownObjectType(s.to_string())),
        }
    }
}

/// Object-size regime a pool is dedicated to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolRegime {
    /// Normal objects below the small-object threshold
    Small,
    /// Large normal objects and all appendable objects
    Large,
}

impl PoolRegime {
    /// Regime a write should land in.
    ///
    /// Appendable objects always go to large pools because they grow after
    /// placement.
    #[must_use]
    pub const fn for_object(object_type: ObjectType, size: u64, small_threshold: u64) -> Self {
        match object_type {
            ObjectType::Appendable => Self::Large,
            ObjectType::Normal if size < small_threshold => Self::Small,
            ObjectType::Normal => Self::Large,
        }
    }
}

impl fmt::Display for PoolRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => f.write_str("small"),
            Self::Large => f.write_str("large"),
        }
    }
}

/// Liveness hint for a cluster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    #[default]
    Live,
    Dead,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_class_parse() {
        assert_eq!("standard".parse::<StorageClass>().unwrap(), StorageClass::Standard);
        assert_eq!("STANDARD_IA".parse::<StorageClass>().unwrap(), StorageClass::StandardIa);
        assert_eq!("standard-ia".parse::<StorageClass>().unwrap(), StorageClass::StandardIa);
        assert_eq!("Glacier".parse::<StorageClass>().unwrap(), StorageClass::Glacier);
        assert!("REDUCED_REDUNDANCY".parse::<StorageClass>().is_err());
    }

    #[test]
    fn test_storage_class_display_matches_s3() {
        for class in StorageClass::ALL {
            assert_eq!(class.as_str().parse::<StorageClass>().unwrap(), class);
        }
        assert_eq!(StorageClass::StandardIa.to_string(), "STANDARD_IA");
    }

    #[test]
    fn test_pool_regime_for_object() {
        let threshold = 128 * 1024;
        assert_eq!(PoolRegime::for_object(ObjectType::Normal, 10, threshold), PoolRegime::Small);
        assert_eq!(
            PoolRegime::for_object(ObjectType::Normal, threshold, threshold),
            PoolRegime::Large
        );
        assert_eq!(PoolRegime::for_object(ObjectType::Appendable, 0, threshold), PoolRegime::Large);
    }

    #[test]
    fn test_object_location_display() {
        let loc = ObjectLocation::new("ceph-a", "rabbit", "obj-1");
        assert_eq!(loc.to_string(), "ceph-a/rabbit/obj-1");
    }
}
