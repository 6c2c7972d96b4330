//! Atomic file replacement (tmp + rename) for state files and restored files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Replace `path` with `bytes` so readers see either the old or new content.
///
/// The temp file lives next to the destination so the rename stays on one
/// filesystem.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path has no parent directory: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, bytes)
        .with_context(|| format!("Failed to write tmp file: {}", tmp_path.display()))?;

    // Windows rename does not replace an existing file
    #[cfg(windows)]
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing file: {}", path.display()))?;
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

/// Copy `src` over `dst` with the same tmp + rename guarantee.
pub fn copy_atomic(src: &Path, dst: &Path) -> anyhow::Result<()> {
    let parent = dst
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path has no parent directory: {}", dst.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let tmp_path = tmp_path_for(dst);
    fs::copy(src, &tmp_path).with_context(|| {
        format!("Failed to copy {} to {}", src.display(), tmp_path.display())
    })?;

    #[cfg(windows)]
    if dst.exists() {
        fs::remove_file(dst)
            .with_context(|| format!("Failed to remove existing file: {}", dst.display()))?;
    }

    if let Err(err) = fs::rename(&tmp_path, dst) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("Failed to replace {}", dst.display()));
    }
    Ok(())
}

/// Point `dst` at `link_target` with a temp symlink renamed into place, so
/// whatever sat at `dst` (file or link) is swapped out in one step.
#[cfg(unix)]
pub fn symlink_atomic(link_target: &Path, dst: &Path) -> anyhow::Result<()> {
    let parent = dst
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path has no parent directory: {}", dst.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let tmp_path = tmp_path_for(dst);
    let _ = fs::remove_file(&tmp_path);
    std::os::unix::fs::symlink(link_target, &tmp_path).with_context(|| {
        format!(
            "Failed to create symlink {} -> {}",
            tmp_path.display(),
            link_target.display()
        )
    })?;

    if let Err(err) = fs::rename(&tmp_path, dst) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("Failed to replace {}", dst.display()));
    }
    Ok(())
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    write_atomic(path, &bytes)
}

/// Read JSON state, returning `None` when the file does not exist yet.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}
