//! Manual (and policy-driven) rollback of a deployment to its snapshot.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::Utc;

use crate::backup::BackupManager;
use crate::error::{ShipyardError, ShipyardResult};
use crate::fs::FileLock;
use crate::types::{DeploymentId, DeploymentStatus};

use super::record::{DeploymentRecord, FailureKind, RollbackInfo};
use super::store::{DeploymentHistory, DeploymentStore};

#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackOptions {
    /// Restore even when a later applied deployment overlaps this one
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    RolledBack(DeploymentRecord),
    /// Record was already rolled back; nothing was touched.
    AlreadyRolledBack(DeploymentRecord),
}

impl RollbackOutcome {
    pub fn record(&self) -> &DeploymentRecord {
        match self {
            Self::RolledBack(record) | Self::AlreadyRolledBack(record) => record,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RollbackExecutor {
    backups: BackupManager,
    store: DeploymentStore,
    lock_path: PathBuf,
}

impl RollbackExecutor {
    pub fn new(backups: BackupManager, store: DeploymentStore, lock_path: PathBuf) -> Self {
        Self {
            backups,
            store,
            lock_path,
        }
    }

    /// Restore the snapshot taken before `id` was applied.
    pub fn rollback(
        &self,
        id: &DeploymentId,
        options: &RollbackOptions,
    ) -> ShipyardResult<RollbackOutcome> {
        let _lock = FileLock::try_exclusive(&self.lock_path)?.ok_or_else(|| ShipyardError::Busy {
            lock: self.lock_path.clone(),
        })?;
        self.rollback_locked(id, options)
    }

    /// Rollback body; the caller must hold the deploy lock.
    pub(crate) fn rollback_locked(
        &self,
        id: &DeploymentId,
        options: &RollbackOptions,
    ) -> ShipyardResult<RollbackOutcome> {
        let history = self.store.load()?;
        let mut record = history
            .get(id)
            .cloned()
            .ok_or_else(|| ShipyardError::not_found("deployment", id))?;

        if record.status == DeploymentStatus::RolledBack {
            tracing::info!(deployment = %id, "deployment already rolled back");
            return Ok(RollbackOutcome::AlreadyRolledBack(record));
        }

        let snapshot_id = match &record.snapshot {
            Some(snapshot) if self.backups.exists(snapshot) => snapshot.clone(),
            _ => return Err(ShipyardError::NoSnapshot(id.clone())),
        };

        if !options.force {
            if let Some(newer) = self.overlapping_newer(&history, &record)? {
                return Err(ShipyardError::RolledBackOutOfOrder {
                    target: id.clone(),
                    newer,
                });
            }
        }

        tracing::info!(deployment = %id, snapshot = %snapshot_id, "rolling back deployment");
        let report = self.backups.restore(&snapshot_id)?;

        if !report.is_success() {
            let failures = report.failures();
            record.attach_failure(
                FailureKind::Restore,
                format!("{} file(s) could not be restored", failures.len()),
            );
            record.rollback = Some(RollbackInfo {
                at: Utc::now(),
                report,
            });
            self.store.update(&record)?;
            return Err(ShipyardError::RestoreFailure {
                snapshot: snapshot_id,
                failures,
            });
        }

        record.rollback = Some(RollbackInfo {
            at: Utc::now(),
            report,
        });
        record.finish(DeploymentStatus::RolledBack);
        self.store.update(&record)?;
        tracing::info!(deployment = %id, "deployment rolled back");
        Ok(RollbackOutcome::RolledBack(record))
    }

    /// First later applied record whose snapshot covers any of `record`'s
    /// paths. A later record whose snapshot is gone counts as overlapping.
    fn overlapping_newer(
        &self,
        history: &DeploymentHistory,
        record: &DeploymentRecord,
    ) -> ShipyardResult<Option<DeploymentId>> {
        let newer: Vec<&DeploymentRecord> = history
            .newer_than(&record.id)
            .iter()
            .filter(|r| r.status == DeploymentStatus::Applied && r.target_root == record.target_root)
            .collect();
        if newer.is_empty() {
            return Ok(None);
        }

        let ours: HashSet<String> = match &record.snapshot {
            Some(id) => self
                .backups
                .get(id)?
                .entries
                .into_iter()
                .map(|e| e.path)
                .collect(),
            None => HashSet::new(),
        };

        for later in newer {
            let overlaps = match &later.snapshot {
                Some(id) if self.backups.exists(id) => self
                    .backups
                    .get(id)?
                    .entries
                    .iter()
                    .any(|e| ours.contains(&e.path)),
                _ => true,
            };
            if overlaps {
                return Ok(Some(later.id.clone()));
            }
        }
        Ok(None)
    }
}
