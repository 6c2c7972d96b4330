//! Config store for loading layered shipyard.toml files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ShipyardError, ShipyardResult};

use super::paths::{
    anchor_path, default_state_dir, global_config_dir, global_config_path, project_config_path,
};
use super::schema::{
    DEFAULT_KEEP_SNAPSHOTS, DEFAULT_MAX_LOG_BYTES, DEFAULT_PROBE_TIMEOUT_SECS,
    DEFAULT_SCRIPT_TIMEOUT_SECS, Settings, ShipyardConfig,
};
use super::{merge_configs, parse_endpoint, parser};

/// Values supplied on the command line; they beat every file layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target_root: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    layers: Vec<PathBuf>,
    explicit: bool,
}

impl ConfigStore {
    /// Global config dir plus the current directory.
    pub fn from_defaults() -> anyhow::Result<Self> {
        let project_root = std::env::current_dir()?;
        let global_dir = global_config_dir();
        Ok(Self::from_layers(global_dir.as_deref(), &project_root))
    }

    pub fn from_paths(global_dir: PathBuf, project_root: PathBuf) -> Self {
        Self::from_layers(Some(&global_dir), &project_root)
    }

    fn from_layers(global_dir: Option<&Path>, project_root: &Path) -> Self {
        let mut layers = Vec::new();
        if let Some(dir) = global_dir {
            layers.push(global_config_path(dir));
        }
        layers.push(project_config_path(project_root));
        Self {
            layers,
            explicit: false,
        }
    }

    /// Read exactly one file, which must exist.
    pub fn from_file(path: PathBuf) -> Self {
        Self {
            layers: vec![path],
            explicit: true,
        }
    }

    pub fn layers(&self) -> &[PathBuf] {
        &self.layers
    }

    /// Load and merge all layers; missing layer files are skipped.
    pub fn load(&self) -> ShipyardResult<ShipyardConfig> {
        let mut merged = ShipyardConfig::default();
        for path in &self.layers {
            if !path.exists() {
                if self.explicit {
                    return Err(ShipyardError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                continue;
            }
            tracing::debug!(path = %path.display(), "loading config layer");
            let mut layer = parser::parse_shipyard_toml(path)
                .map_err(|e| ShipyardError::Config(format!("{:#}", e)))?;
            let config_dir = path.parent().unwrap_or_else(|| Path::new("."));
            layer.target_root = layer.target_root.map(|p| anchor_path(p, config_dir));
            layer.state_dir = layer.state_dir.map(|p| anchor_path(p, config_dir));
            merged = merge_configs(merged, layer);
        }
        Ok(merged)
    }

    /// Load, apply overrides and defaults.
    pub fn resolve(&self, overrides: &Overrides) -> ShipyardResult<Settings> {
        let config = self.load()?;
        resolve_settings(config, overrides)
    }
}

pub fn resolve_settings(config: ShipyardConfig, overrides: &Overrides) -> ShipyardResult<Settings> {
    let state_dir = match overrides.state_dir.clone().or(config.state_dir) {
        Some(dir) => dir,
        None => default_state_dir()?,
    };

    let endpoints = config
        .verify
        .endpoints
        .unwrap_or_default()
        .iter()
        .map(|raw| parse_endpoint(raw).map_err(|e| ShipyardError::Config(format!("{:#}", e))))
        .collect::<ShipyardResult<Vec<_>>>()?;

    Ok(Settings {
        target_root: overrides.target_root.clone().or(config.target_root),
        state_dir,
        script_timeout: Duration::from_secs(
            config
                .deploy
                .script_timeout_secs
                .unwrap_or(DEFAULT_SCRIPT_TIMEOUT_SECS),
        ),
        max_log_bytes: config.deploy.max_log_bytes.unwrap_or(DEFAULT_MAX_LOG_BYTES),
        probe_timeout: Duration::from_secs(
            config
                .verify
                .timeout_secs
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
        ),
        endpoints,
        auto_rollback: config.verify.auto_rollback.unwrap_or(false),
        probe_use_proxy: config.verify.use_proxy.unwrap_or(true),
        keep_snapshots: config.snapshots.keep.unwrap_or(DEFAULT_KEEP_SNAPSHOTS),
    })
}
