//! Path guards for archive entries and snapshot targets.

use std::path::{Component, Path, PathBuf};

/// Reject absolute paths and any `..` component.
pub fn ensure_relative_path(path: &Path) -> anyhow::Result<()> {
    if path.as_os_str().is_empty() {
        anyhow::bail!("Empty path not allowed");
    }
    if path.is_absolute() {
        anyhow::bail!("Absolute paths not allowed: {}", path.display());
    }
    for component in path.components() {
        match component {
            Component::ParentDir => {
                anyhow::bail!("Path traversal not allowed: {}", path.display())
            }
            Component::Prefix(_) | Component::RootDir => {
                anyhow::bail!("Absolute paths not allowed: {}", path.display())
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

/// Join a checked relative path onto `root`.
pub fn resolve_under(root: &Path, relative: &Path) -> anyhow::Result<PathBuf> {
    ensure_relative_path(relative)?;
    Ok(root.join(relative))
}
