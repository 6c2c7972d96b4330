//! Deployment workflow: snapshot, apply, verify, and manual rollback.
//!
//! Every apply attempt leaves a [`DeploymentRecord`] in the
//! [`DeploymentStore`]. Deploy and rollback share one exclusive lock per
//! state directory.

pub mod cancel;
pub mod executor;
pub mod record;
pub mod rollback;
pub mod store;
pub mod task;

pub use cancel::CancelFlag;
pub use executor::{DeployOptions, DeploymentExecutor, ExecutorConfig};
pub use record::{DeploymentRecord, Failure, FailureKind, RollbackInfo, StepLog};
pub use rollback::{RollbackExecutor, RollbackOptions, RollbackOutcome};
pub use store::{DeploymentHistory, DeploymentStore};
pub use task::{DeployTask, PayloadTask, ScriptTask, TaskContext, TaskOutcome};
