//! Configuration schema for shipyard.toml
//!
//! Every field is optional so global and project layers can be merged key by
//! key; [`Settings`] is the fully defaulted view handed to the services.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_LOG_BYTES: usize = 64 * 1024;
pub const DEFAULT_KEEP_SNAPSHOTS: usize = 10;

/// Root configuration structure for shipyard.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShipyardConfig {
    /// Directory tree packages are deployed onto
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_root: Option<PathBuf>,

    /// Where packages, snapshots and deployment history are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub deploy: DeploySection,

    #[serde(default)]
    pub verify: VerifySection,

    #[serde(default)]
    pub snapshots: SnapshotSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_timeout_secs: Option<u64>,

    /// Cap on captured stdout and stderr, each
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_log_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Vec<String>>,

    /// Roll back automatically when post-deploy verification fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_rollback: Option<bool>,

    /// Route health checks through the HTTP(S)_PROXY environment settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_proxy: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<usize>,
}

/// Resolved settings with defaults applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target_root: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub script_timeout: Duration,
    pub max_log_bytes: usize,
    pub probe_timeout: Duration,
    pub endpoints: Vec<Url>,
    pub auto_rollback: bool,
    pub probe_use_proxy: bool,
    pub keep_snapshots: usize,
}

impl Settings {
    /// Defaults rooted at an explicit state directory.
    pub fn with_state_dir(state_dir: PathBuf) -> Self {
        Self {
            target_root: None,
            state_dir,
            script_timeout: Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS),
            max_log_bytes: DEFAULT_MAX_LOG_BYTES,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            endpoints: Vec::new(),
            auto_rollback: false,
            probe_use_proxy: true,
            keep_snapshots: DEFAULT_KEEP_SNAPSHOTS,
        }
    }

    pub fn with_target_root(mut self, target_root: PathBuf) -> Self {
        self.target_root = Some(target_root);
        self
    }
}
