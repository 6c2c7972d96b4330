//! Shared identifier and status types used across the registry, backup and
//! deployment layers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Package identifier, `name@version`.
    PackageId
);
id_type!(
    /// Backup snapshot identifier, time-ordered.
    SnapshotId
);
id_type!(
    /// Deployment record identifier, time-ordered.
    DeploymentId
);

impl PackageId {
    pub fn new(name: &str, version: &semver::Version) -> Self {
        Self(format!("{}@{}", name, version))
    }
}

impl SnapshotId {
    pub fn generate() -> Self {
        Self(generate_id("s"))
    }
}

impl DeploymentId {
    pub fn generate() -> Self {
        Self(generate_id("d"))
    }
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `<prefix>-<utc timestamp>-<6 hex>`; lexicographic order follows creation
/// order at nanosecond resolution.
fn generate_id(prefix: &str) -> String {
    let now = chrono::Utc::now();
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = blake3::Hasher::new();
    hasher.update(&now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&seq.to_le_bytes());
    let suffix = hasher.finalize().to_hex();
    format!(
        "{}-{}-{}",
        prefix,
        now.format("%Y%m%dT%H%M%S%9f"),
        &suffix[..6]
    )
}

/// Lifecycle of a deployment record.
///
/// `Pending` is the only non-terminal state; a record left pending means the
/// process died mid-apply and the record can still be rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    Pending,
    Applied,
    Failed,
    /// Cancelled before the script step wrote anything.
    Cancelled,
    RolledBack,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::RolledBack => "rolled-back",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_id_joins_name_and_version() {
        let version = semver::Version::parse("1.2.3").unwrap();
        assert_eq!(PackageId::new("calendar", &version).as_str(), "calendar@1.2.3");
    }

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = DeploymentId::generate();
        let b = DeploymentId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("d-"));
        assert!(SnapshotId::generate().as_str().starts_with("s-"));
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&DeploymentStatus::RolledBack).unwrap();
        assert_eq!(json, "\"rolled-back\"");
        assert_eq!(DeploymentStatus::RolledBack.to_string(), "rolled-back");
        assert!(!DeploymentStatus::Pending.is_terminal());
    }
}
