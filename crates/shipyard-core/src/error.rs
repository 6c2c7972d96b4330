//! Error taxonomy for deployment operations.
//!
//! Storage helpers use `anyhow` for context chains; everything they report
//! surfaces here as [`ShipyardError::Internal`].

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{DeploymentId, PackageId, SnapshotId};

/// Result alias for shipyard operations.
pub type ShipyardResult<T> = Result<T, ShipyardError>;

#[derive(Debug, Error)]
pub enum ShipyardError {
    /// Archive rejected at registration; nothing was stored.
    #[error("invalid package {archive}: {reason}")]
    InvalidPackage { archive: PathBuf, reason: String },

    /// Same id already registered with different archive content.
    #[error("package {0} is already registered with different content; bump the version")]
    PackageExists(PackageId),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Another deployment or rollback holds the target lock.
    #[error("another deployment is in progress (lock held at {lock})")]
    Busy { lock: PathBuf },

    /// Deploy script ran and did not succeed.
    #[error("deployment {deployment} failed: {message}")]
    ExecutionFailure {
        deployment: DeploymentId,
        message: String,
    },

    #[error("verification failed for {failed} of {total} endpoints")]
    VerificationFailure { failed: usize, total: usize },

    #[error("deployment {0} has no snapshot to restore")]
    NoSnapshot(DeploymentId),

    /// Some files could not be restored; each entry is `path: message`.
    #[error("restore of snapshot {snapshot} failed for {} file(s): {}", .failures.len(), .failures.join("; "))]
    RestoreFailure {
        snapshot: SnapshotId,
        failures: Vec<String>,
    },

    #[error("deployment {target} is covered by later applied deployment {newer}; use --force to restore anyway")]
    RolledBackOutOfOrder {
        target: DeploymentId,
        newer: DeploymentId,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ShipyardError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_package(archive: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPackage {
            archive: archive.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code distinguishing each failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidPackage { .. } | Self::PackageExists(_) => 2,
            Self::ExecutionFailure { .. } => 3,
            Self::VerificationFailure { .. } => 4,
            Self::NoSnapshot(_) | Self::RestoreFailure { .. } | Self::RolledBackOutOfOrder { .. } => 5,
            Self::Busy { .. } => 6,
            Self::NotFound { .. } => 7,
            Self::Config(_) | Self::Internal(_) => 1,
        }
    }
}
