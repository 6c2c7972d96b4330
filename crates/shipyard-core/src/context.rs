//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};

use crate::backup::BackupManager;
use crate::config::Settings;
use crate::deploy::{DeploymentExecutor, DeploymentStore, ExecutorConfig, RollbackExecutor};
use crate::error::{ShipyardError, ShipyardResult};
use crate::package::PackageRegistry;
use crate::types::{DeploymentStatus, SnapshotId};
use crate::verify::VerificationProbe;

const LOCK_FILE: &str = "deploy.lock";
const HISTORY_FILE: &str = "deployments.json";

/// Unified application context.
///
/// Frontends resolve [`Settings`] once, build this, and ask it for the
/// services each command needs; all of them share one state directory.
#[derive(Debug, Clone)]
pub struct AppContext {
    settings: Settings,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state_dir(&self) -> &Path {
        &self.settings.state_dir
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    /// Target root, required by deploy and rollback.
    pub fn target_root(&self) -> ShipyardResult<&Path> {
        self.settings.target_root.as_deref().ok_or_else(|| {
            ShipyardError::Config(
                "no target root configured; set target_root in shipyard.toml or pass --target-root"
                    .to_string(),
            )
        })
    }

    pub fn package_registry(&self) -> PackageRegistry {
        PackageRegistry::new(self.state_dir().join("packages"))
    }

    pub fn backup_manager(&self) -> BackupManager {
        BackupManager::new(self.state_dir().join("snapshots"))
    }

    pub fn deployment_store(&self) -> DeploymentStore {
        DeploymentStore::new(self.state_dir().join(HISTORY_FILE))
    }

    pub fn verification_probe(&self) -> ShipyardResult<VerificationProbe> {
        VerificationProbe::new(self.settings.probe_timeout, self.settings.probe_use_proxy)
    }

    pub fn deployment_executor(&self) -> ShipyardResult<DeploymentExecutor> {
        let config = ExecutorConfig {
            target_root: self.target_root()?.to_path_buf(),
            work_root: self.state_dir().join("work"),
            lock_path: self.lock_path(),
            script_timeout: self.settings.script_timeout,
            max_log_bytes: self.settings.max_log_bytes,
        };
        Ok(DeploymentExecutor::new(
            self.package_registry(),
            self.backup_manager(),
            self.deployment_store(),
            self.verification_probe()?,
            config,
        ))
    }

    /// Rollback restores into the root each snapshot was taken from, so no
    /// target root is needed here.
    pub fn rollback_executor(&self) -> RollbackExecutor {
        RollbackExecutor::new(
            self.backup_manager(),
            self.deployment_store(),
            self.lock_path(),
        )
    }

    /// Delete old snapshots beyond `keep` (default: configured retention).
    ///
    /// Snapshots of records that can still be rolled back are kept.
    pub fn prune_snapshots(&self, keep: Option<usize>) -> ShipyardResult<Vec<SnapshotId>> {
        let keep = keep.unwrap_or(self.settings.keep_snapshots);
        let protected: Vec<SnapshotId> = self
            .deployment_store()
            .list()?
            .into_iter()
            .filter(|r| r.status != DeploymentStatus::RolledBack)
            .filter_map(|r| r.snapshot)
            .collect();
        self.backup_manager().prune(keep, &protected)
    }
}
