//! Error types for Strata
//!
//! This module defines the common error types used throughout the core.

use crate::types::{ClusterId, ObjectLocation, ObjectType, PoolRegime, StorageClass};
use thiserror::Error;

/// Common result type for Strata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Strata
#[derive(Debug, Error)]
pub enum Error {
    // Placement errors
    #[error("no eligible cluster for storage class {storage_class} and {object_type} objects")]
    NoEligibleCluster {
        storage_class: StorageClass,
        object_type: ObjectType,
    },

    #[error(
        "configuration integrity fault: clusters {clusters:?} advertise {storage_class} but have no {regime} pool for it"
    )]
    ConfigurationIntegrityFault {
        clusters: Vec<ClusterId>,
        storage_class: StorageClass,
        regime: PoolRegime,
    },

    #[error("unknown cluster: {0}")]
    UnknownCluster(ClusterId),

    // Backend errors
    #[error("backend cluster {cluster} unavailable: {reason}")]
    BackendUnavailable { cluster: ClusterId, reason: String },

    #[error("object not found: {location}")]
    ObjectNotFound { location: ObjectLocation },

    #[error("request timeout")]
    Timeout,

    // Metadata errors
    #[error("registry refresh failed: {0}")]
    RegistryRefreshFailed(String),

    // Internal errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a backend-unavailable error for a cluster
    pub fn backend_unavailable(cluster: ClusterId, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            cluster,
            reason: reason.into(),
        }
    }

    /// Check if this is a retryable error
    ///
    /// Placement failures are not retryable: without a registry change the
    /// same request yields the same answer.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::BackendUnavailable { .. } | Self::RegistryRefreshFailed(_)
        )
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. } | Self::UnknownCluster(_))
    }

    /// Get HTTP status code the gateway front end should map this to
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::ObjectNotFound { .. } => 404,
            Self::Internal(_) | Self::ConfigurationIntegrityFault { .. } | Self::UnknownCluster(_) => {
                500
            }
            Self::NoEligibleCluster { .. }
            | Self::BackendUnavailable { .. }
            | Self::Timeout
            | Self::RegistryRefreshFailed(_)
            | Self::Configuration(_) => 503,
        }
    }

    /// Get S3 error code for API compatibility
    #[must_use]
    pub const fn s3_error_code(&self) -> &'static str {
        match self {
            Self::ObjectNotFound { .. } => "NoSuchKey",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::NoEligibleCluster { .. }
            | Self::BackendUnavailable { .. }
            | Self::Timeout
            | Self::RegistryRefreshFailed(_) => "ServiceUnavailable",
            _ => "InternalError",
        }
    }
}
