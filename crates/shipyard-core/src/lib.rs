//! Shipyard Core Library
//!
//! Package-based deployment with backup snapshots, post-deploy verification
//! and manual rollback. Frontends build an [`AppContext`](context::AppContext)
//! from resolved settings and drive the workflow through its services.

pub mod backup;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod fs;
pub mod package;
pub mod types;
pub mod verify;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, Overrides, Settings, ShipyardConfig};
    pub use crate::context::AppContext;

    // Errors
    pub use crate::error::{ShipyardError, ShipyardResult};

    // Packages and snapshots
    pub use crate::backup::{BackupManager, RestoreOutcome, RestoreReport, Snapshot};
    pub use crate::package::{Package, PackageRegistry, RegisterOutcome};

    // Deployment
    pub use crate::deploy::{
        CancelFlag, DeployOptions, DeploymentExecutor, DeploymentRecord, DeploymentStore,
        RollbackExecutor, RollbackOptions, RollbackOutcome,
    };
    pub use crate::types::{DeploymentId, DeploymentStatus, PackageId, SnapshotId};

    // Verification
    pub use crate::verify::{EndpointStatus, ProbeReport, VerificationProbe};
}
