//! Layer merging: project values override global values key by key.

use super::schema::{DeploySection, ShipyardConfig, SnapshotSection, VerifySection};

/// Merge `overlay` on top of `base`.
///
/// `verify.endpoints` is replaced as a whole, never concatenated.
pub fn merge_configs(base: ShipyardConfig, overlay: ShipyardConfig) -> ShipyardConfig {
    ShipyardConfig {
        target_root: overlay.target_root.or(base.target_root),
        state_dir: overlay.state_dir.or(base.state_dir),
        deploy: DeploySection {
            script_timeout_secs: overlay
                .deploy
                .script_timeout_secs
                .or(base.deploy.script_timeout_secs),
            max_log_bytes: overlay.deploy.max_log_bytes.or(base.deploy.max_log_bytes),
        },
        verify: VerifySection {
            timeout_secs: overlay.verify.timeout_secs.or(base.verify.timeout_secs),
            endpoints: overlay.verify.endpoints.or(base.verify.endpoints),
            auto_rollback: overlay.verify.auto_rollback.or(base.verify.auto_rollback),
            use_proxy: overlay.verify.use_proxy.or(base.verify.use_proxy),
        },
        snapshots: SnapshotSection {
            keep: overlay.snapshots.keep.or(base.snapshots.keep),
        },
    }
}
