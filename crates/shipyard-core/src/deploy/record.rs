//! Deployment records: the audit trail of every apply attempt.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backup::RestoreReport;
use crate::error::ShipyardError;
use crate::types::{DeploymentId, DeploymentStatus, PackageId, SnapshotId};
use crate::verify::ProbeReport;

use super::task::TaskOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Script exited nonzero or a task reported failure
    Execution,
    /// Script exceeded its time budget and was killed
    Timeout,
    /// Post-deploy health checks failed; files stay applied
    Verification,
    /// Rollback could not restore every file
    Restore,
    /// Snapshot, extraction or storage error
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Captured result of one pipeline task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    pub task: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl StepLog {
    pub fn from_outcome(task: &str, outcome: &TaskOutcome) -> Self {
        Self {
            task: task.to_string(),
            success: outcome.success,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            duration_ms: outcome.duration.as_millis() as u64,
            stdout: outcome.stdout.clone(),
            stderr: outcome.stderr.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub at: DateTime<Utc>,
    pub report: RestoreReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub package: PackageId,
    pub target_root: PathBuf,
    /// Set once the pre-deployment snapshot is captured
    pub snapshot: Option<SnapshotId>,
    pub status: DeploymentStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<StepLog>,
    /// Most recent failure attached to this record
    pub failure: Option<Failure>,
    pub verification: Option<ProbeReport>,
    /// Report of the last restore attempt, successful or not
    pub rollback: Option<RollbackInfo>,
}

impl DeploymentRecord {
    pub fn pending(package: PackageId, target_root: PathBuf) -> Self {
        Self {
            id: DeploymentId::generate(),
            package,
            target_root,
            snapshot: None,
            status: DeploymentStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            failure: None,
            verification: None,
            rollback: None,
        }
    }

    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = DeploymentStatus::Failed;
            self.finished_at = Some(Utc::now());
        }
        self.attach_failure(kind, message);
    }

    /// Record a failure without changing status.
    pub fn attach_failure(&mut self, kind: FailureKind, message: impl Into<String>) {
        self.failure = Some(Failure {
            kind,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn finish(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Combined output of the failing step, for error messages.
    pub fn failure_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }

    /// Error a finished deploy should surface to the operator, if any.
    pub fn outcome_error(&self) -> Option<ShipyardError> {
        let failure = self.failure.as_ref()?;
        match failure.kind {
            FailureKind::Execution | FailureKind::Timeout
                if self.status == DeploymentStatus::Failed =>
            {
                Some(ShipyardError::ExecutionFailure {
                    deployment: self.id.clone(),
                    message: failure.message.clone(),
                })
            }
            FailureKind::Verification => {
                let report = self.verification.as_ref()?;
                Some(ShipyardError::VerificationFailure {
                    failed: report.failed_count(),
                    total: report.results.len(),
                })
            }
            _ => None,
        }
    }
}
