//! Deployment history persisted at `<state_dir>/deployments.json`.
//!
//! Every method loads, modifies and saves (tmp + rename). Writers are
//! serialized by the deploy lock held by the executors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ShipyardError, ShipyardResult};
use crate::fs::{read_json, write_json_atomic};
use crate::types::{DeploymentId, DeploymentStatus};

use super::record::DeploymentRecord;

const HISTORY_VERSION: u32 = 1;

/// All records in creation order plus the current-deployment pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentHistory {
    pub version: u32,
    /// Latest applied record, if any
    pub current: Option<DeploymentId>,
    pub records: Vec<DeploymentRecord>,
}

impl DeploymentHistory {
    pub fn new() -> Self {
        Self {
            version: HISTORY_VERSION,
            current: None,
            records: Vec::new(),
        }
    }

    pub fn get(&self, id: &DeploymentId) -> Option<&DeploymentRecord> {
        self.records.iter().find(|r| r.id == *id)
    }

    /// Re-point `current` at the newest applied record.
    fn refresh_current(&mut self) {
        self.current = self
            .records
            .iter()
            .rev()
            .find(|r| r.status == DeploymentStatus::Applied)
            .map(|r| r.id.clone());
    }

    /// Records created after `id`.
    pub fn newer_than(&self, id: &DeploymentId) -> &[DeploymentRecord] {
        match self.records.iter().position(|r| r.id == *id) {
            Some(idx) => &self.records[idx + 1..],
            None => &[],
        }
    }
}

impl Default for DeploymentHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> ShipyardResult<DeploymentHistory> {
        let history: DeploymentHistory = read_json(&self.path)?.unwrap_or_default();
        if history.version != HISTORY_VERSION {
            return Err(anyhow::anyhow!(
                "Unsupported deployment history version: {}",
                history.version
            )
            .into());
        }
        Ok(history)
    }

    fn save(&self, history: &DeploymentHistory) -> ShipyardResult<()> {
        write_json_atomic(&self.path, history)?;
        Ok(())
    }

    /// Append a new record.
    pub fn insert(&self, record: &DeploymentRecord) -> ShipyardResult<()> {
        let mut history = self.load()?;
        if history.get(&record.id).is_some() {
            return Err(anyhow::anyhow!("Deployment {} already recorded", record.id).into());
        }
        history.records.push(record.clone());
        history.refresh_current();
        self.save(&history)
    }

    /// Replace a stored record and recompute the current pointer.
    pub fn update(&self, record: &DeploymentRecord) -> ShipyardResult<()> {
        let mut history = self.load()?;
        let slot = history
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| ShipyardError::not_found("deployment", &record.id))?;
        *slot = record.clone();
        history.refresh_current();
        self.save(&history)
    }

    pub fn get(&self, id: &DeploymentId) -> ShipyardResult<DeploymentRecord> {
        self.load()?
            .get(id)
            .cloned()
            .ok_or_else(|| ShipyardError::not_found("deployment", id))
    }

    pub fn list(&self) -> ShipyardResult<Vec<DeploymentRecord>> {
        Ok(self.load()?.records)
    }

    pub fn current(&self) -> ShipyardResult<Option<DeploymentRecord>> {
        let history = self.load()?;
        Ok(history
            .current
            .as_ref()
            .and_then(|id| history.get(id))
            .cloned())
    }
}
