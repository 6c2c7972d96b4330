//! Config and state path resolution helpers.

use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "shipyard.toml";

pub fn global_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("shipyard"))
}

pub fn global_config_path(global_dir: &Path) -> PathBuf {
    global_dir.join(CONFIG_FILE_NAME)
}

pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_FILE_NAME)
}

/// Default state directory
///
/// - Unix: `$XDG_STATE_HOME/shipyard` or `~/.local/state/shipyard`
/// - Windows: `%LOCALAPPDATA%\shipyard`
pub fn default_state_dir() -> anyhow::Result<PathBuf> {
    let base = if cfg!(unix) {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?
    } else {
        dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine local app data directory"))?
    };
    Ok(base.join("shipyard"))
}

/// Relative paths in a config file are taken relative to the file's directory.
pub fn anchor_path(path: PathBuf, config_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        config_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_keeps_absolute_paths() {
        assert_eq!(
            anchor_path(PathBuf::from("/srv/app"), Path::new("/etc")),
            PathBuf::from("/srv/app")
        );
        assert_eq!(
            anchor_path(PathBuf::from("public"), Path::new("/home/op/site")),
            PathBuf::from("/home/op/site/public")
        );
    }
}
