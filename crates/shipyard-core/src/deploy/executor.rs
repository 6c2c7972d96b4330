//! Deploy a registered package onto the target root.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use url::Url;

use crate::backup::BackupManager;
use crate::error::{ShipyardError, ShipyardResult};
use crate::fs::FileLock;
use crate::package::{Package, PackageRegistry, extract_archive};
use crate::types::{DeploymentStatus, PackageId};
use crate::verify::VerificationProbe;

use super::cancel::CancelFlag;
use super::record::{DeploymentRecord, FailureKind, StepLog};
use super::rollback::{RollbackExecutor, RollbackOptions};
use super::store::DeploymentStore;
use super::task::{DeployTask, PayloadTask, ScriptTask, TaskContext};

/// Per-invocation deploy switches.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Health endpoints checked after apply; empty skips verification
    pub endpoints: Vec<Url>,
    /// Restore the snapshot when verification fails
    pub auto_rollback: bool,
    pub cancel: CancelFlag,
}

/// Paths and limits the executor works within.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub target_root: PathBuf,
    /// Parent of the per-deployment working directories
    pub work_root: PathBuf,
    pub lock_path: PathBuf,
    pub script_timeout: Duration,
    pub max_log_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct DeploymentExecutor {
    registry: PackageRegistry,
    backups: BackupManager,
    store: DeploymentStore,
    probe: VerificationProbe,
    rollback: RollbackExecutor,
    config: ExecutorConfig,
}

impl DeploymentExecutor {
    pub fn new(
        registry: PackageRegistry,
        backups: BackupManager,
        store: DeploymentStore,
        probe: VerificationProbe,
        config: ExecutorConfig,
    ) -> Self {
        let rollback =
            RollbackExecutor::new(backups.clone(), store.clone(), config.lock_path.clone());
        Self {
            registry,
            backups,
            store,
            probe,
            rollback,
            config,
        }
    }

    pub fn target_root(&self) -> &Path {
        &self.config.target_root
    }

    /// Snapshot, extract and apply `package`, then verify if endpoints were
    /// given.
    ///
    /// A script that runs and fails is not an `Err`: the returned record is
    /// `Failed` with the failure attached (see
    /// [`DeploymentRecord::outcome_error`]). `Err` is reserved for cases where
    /// the workflow itself could not proceed; the record, if one was created,
    /// still carries the failure.
    pub async fn deploy(
        &self,
        package: &PackageId,
        options: &DeployOptions,
    ) -> ShipyardResult<DeploymentRecord> {
        let package = self.registry.get(package)?;
        let _lock =
            FileLock::try_exclusive(&self.config.lock_path)?.ok_or_else(|| ShipyardError::Busy {
                lock: self.config.lock_path.clone(),
            })?;

        let mut record =
            DeploymentRecord::pending(package.id.clone(), self.config.target_root.clone());
        self.store.insert(&record)?;
        tracing::info!(deployment = %record.id, package = %package.id, "starting deployment");

        let work_dir = self.config.work_root.join(record.id.as_str());
        let applied = self
            .apply(&package, &mut record, &work_dir, &options.cancel)
            .await;
        if work_dir.exists() {
            if let Err(err) = fs::remove_dir_all(&work_dir) {
                tracing::warn!(dir = %work_dir.display(), error = %err, "failed to remove working directory");
            }
        }

        if let Err(err) = applied {
            record.fail(FailureKind::Internal, format!("{:#}", err));
            if let Err(save_err) = self.store.update(&record) {
                tracing::warn!(deployment = %record.id, error = %save_err, "failed to save deployment record");
            }
            return Err(err);
        }
        self.store.update(&record)?;

        match record.status {
            DeploymentStatus::Applied => {
                tracing::info!(deployment = %record.id, package = %package.id, "deployment applied");
            }
            DeploymentStatus::Cancelled => {
                tracing::info!(deployment = %record.id, "deployment cancelled before apply");
                return Ok(record);
            }
            _ => {
                tracing::warn!(
                    deployment = %record.id,
                    reason = record.failure_message().unwrap_or_default(),
                    "deployment failed"
                );
                return Ok(record);
            }
        }

        if options.endpoints.is_empty() {
            return Ok(record);
        }
        self.verify(record, options).await
    }

    /// Steps 3 to 6: snapshot, extract, run the pipeline. Leaves the record
    /// Applied, Failed or Cancelled unless an `Err` is returned.
    async fn apply(
        &self,
        package: &Package,
        record: &mut DeploymentRecord,
        work_dir: &Path,
        cancel: &CancelFlag,
    ) -> ShipyardResult<()> {
        if cancel.is_cancelled() {
            record.finish(DeploymentStatus::Cancelled);
            return Ok(());
        }

        let snapshot = self
            .backups
            .snapshot(&self.config.target_root, &package.target_paths())?;
        record.snapshot = Some(snapshot.id.clone());
        self.store.update(record)?;

        if cancel.is_cancelled() {
            record.finish(DeploymentStatus::Cancelled);
            return Ok(());
        }

        if work_dir.exists() {
            fs::remove_dir_all(work_dir).with_context(|| {
                format!("Failed to clear working directory: {}", work_dir.display())
            })?;
        }
        fs::create_dir_all(work_dir).with_context(|| {
            format!("Failed to create working directory: {}", work_dir.display())
        })?;
        let extracted = extract_archive(&self.registry.archive_path(package), work_dir)?;
        tracing::debug!(files = extracted.len(), dir = %work_dir.display(), "extracted package");

        let ctx = TaskContext {
            deployment: record.id.clone(),
            package: package.clone(),
            work_dir: work_dir.to_path_buf(),
            target_root: self.config.target_root.clone(),
            timeout: self.config.script_timeout,
            max_log_bytes: self.config.max_log_bytes,
        };

        let mut committed = false;
        for task in pipeline(package) {
            if !committed && task.mutates_target() {
                if cancel.is_cancelled() {
                    record.finish(DeploymentStatus::Cancelled);
                    return Ok(());
                }
                committed = true;
            }

            let outcome = task.run(&ctx).await?;
            record.steps.push(StepLog::from_outcome(task.name(), &outcome));
            if !outcome.success {
                let kind = if outcome.timed_out {
                    FailureKind::Timeout
                } else {
                    FailureKind::Execution
                };
                record.fail(kind, outcome.describe_failure(task.name()));
                return Ok(());
            }
        }

        if committed && cancel.is_cancelled() {
            tracing::warn!(
                deployment = %record.id,
                "cancellation requested after apply started; ignored, roll back explicitly"
            );
        }
        record.finish(DeploymentStatus::Applied);
        Ok(())
    }

    /// Probe endpoints while still holding the lock and attach the report.
    async fn verify(
        &self,
        mut record: DeploymentRecord,
        options: &DeployOptions,
    ) -> ShipyardResult<DeploymentRecord> {
        let report = self.probe.check(&options.endpoints).await;
        let failed = report.failed_count();
        let total = report.results.len();
        for result in report.results.iter().filter(|r| !r.status.is_healthy()) {
            tracing::warn!(endpoint = %result.endpoint, status = ?result.status, "endpoint unhealthy");
        }
        record.verification = Some(report);

        if failed == 0 {
            self.store.update(&record)?;
            tracing::info!(deployment = %record.id, endpoints = total, "verification passed");
            return Ok(record);
        }

        record.attach_failure(
            FailureKind::Verification,
            format!("verification failed for {} of {} endpoints", failed, total),
        );
        self.store.update(&record)?;

        if !options.auto_rollback {
            return Ok(record);
        }
        tracing::info!(deployment = %record.id, "verification failed, rolling back");
        let outcome = self
            .rollback
            .rollback_locked(&record.id, &RollbackOptions { force: true })?;
        Ok(outcome.record().clone())
    }
}

/// Tasks run for `package`, in order.
fn pipeline(package: &Package) -> Vec<Box<dyn DeployTask>> {
    let mut tasks: Vec<Box<dyn DeployTask>> = Vec::new();
    if package.copy_payload {
        tasks.push(Box::new(PayloadTask));
    }
    tasks.push(Box::new(ScriptTask));
    tasks
}
