//! Snapshot storage under `<state_dir>/snapshots`.
//!
//! Layout per snapshot:
//! - `<id>/snapshot.json`: entry list, written last
//! - `<id>/files/<digest>`: saved file contents
//!
//! A snapshot directory without `snapshot.json` is an interrupted capture and
//! is ignored by [`BackupManager::list`].

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::error::{ShipyardError, ShipyardResult};
use crate::fs::{copy_atomic, ensure_relative_path, hash_file, read_json, write_json_atomic};
use crate::types::SnapshotId;

use super::snapshot::{EntryState, FileRestore, RestoreOutcome, RestoreReport, Snapshot, SnapshotEntry};

const SNAPSHOT_FILE: &str = "snapshot.json";

#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save the current state of `paths` (relative to `target_root`).
    ///
    /// Missing files are recorded as absent. Duplicate paths are captured
    /// once.
    pub fn snapshot(&self, target_root: &Path, paths: &[String]) -> ShipyardResult<Snapshot> {
        let id = SnapshotId::generate();
        let dir = self.snapshot_dir(&id);
        let files_dir = dir.join("files");
        fs::create_dir_all(&files_dir)
            .with_context(|| format!("Failed to create snapshot directory: {}", dir.display()))?;

        match self.capture(&id, target_root, paths, &files_dir) {
            Ok(snapshot) => {
                write_json_atomic(&dir.join(SNAPSHOT_FILE), &snapshot)?;
                tracing::info!(
                    snapshot = %snapshot.id,
                    saved = snapshot.saved_count(),
                    absent = snapshot.absent_count(),
                    "captured snapshot"
                );
                Ok(snapshot)
            }
            Err(err) => {
                let _ = fs::remove_dir_all(&dir);
                Err(err)
            }
        }
    }

    fn capture(
        &self,
        id: &SnapshotId,
        target_root: &Path,
        paths: &[String],
        files_dir: &Path,
    ) -> ShipyardResult<Snapshot> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(paths.len());
        let mut absent_dirs: Vec<String> = Vec::new();

        for path in paths {
            if !seen.insert(path.as_str()) {
                continue;
            }
            let relative = Path::new(path);
            ensure_relative_path(relative)?;
            let target = target_root.join(relative);

            let state = match fs::symlink_metadata(&target) {
                Ok(meta) if meta.is_file() => {
                    let digest = hash_file(&target)?;
                    let blob = files_dir.join(&digest);
                    if !blob.exists() {
                        fs::copy(&target, &blob).with_context(|| {
                            format!("Failed to save {} into snapshot", target.display())
                        })?;
                    }
                    EntryState::Saved {
                        digest,
                        size: meta.len(),
                    }
                }
                Ok(meta) if meta.file_type().is_symlink() => EntryState::Symlink {
                    target: fs::read_link(&target)
                        .with_context(|| format!("Failed to read link {}", target.display()))?,
                },
                Ok(_) => {
                    return Err(anyhow::anyhow!(
                        "Cannot snapshot {}: not a regular file or symlink",
                        target.display()
                    )
                    .into());
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    for dir in missing_ancestors(target_root, relative) {
                        if !absent_dirs.contains(&dir) {
                            absent_dirs.push(dir);
                        }
                    }
                    EntryState::Absent
                }
                Err(err) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("Failed to stat {}", target.display()))
                        .into());
                }
            };
            tracing::debug!(path = %path, ?state, "snapshot entry");
            entries.push(SnapshotEntry {
                path: path.clone(),
                state,
            });
        }

        // Deepest first so restore can remove children before parents
        absent_dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));

        Ok(Snapshot {
            id: id.clone(),
            created_at: chrono::Utc::now(),
            target_root: target_root.to_path_buf(),
            entries,
            absent_dirs,
        })
    }

    /// Put every entry back: saved files are rewritten (tmp + rename) and
    /// absent files removed. Each file gets its own outcome; one failure does
    /// not stop the rest.
    pub fn restore(&self, id: &SnapshotId) -> ShipyardResult<RestoreReport> {
        let snapshot = self.get(id)?;
        let files_dir = self.snapshot_dir(id).join("files");

        let files = snapshot
            .entries
            .iter()
            .map(|entry| {
                let target = snapshot.target_root.join(&entry.path);
                let outcome = match restore_entry(&entry.state, &target, &files_dir) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        tracing::warn!(path = %entry.path, error = %format!("{:#}", err), "restore failed");
                        RestoreOutcome::Failed {
                            message: format!("{:#}", err),
                        }
                    }
                };
                FileRestore {
                    path: entry.path.clone(),
                    outcome,
                }
            })
            .collect();

        for dir in &snapshot.absent_dirs {
            let path = snapshot.target_root.join(dir);
            // Only empty directories go; anything else now owns them
            if fs::remove_dir(&path).is_ok() {
                tracing::debug!(dir = %path.display(), "removed directory created by deployment");
            }
        }

        let report = RestoreReport {
            snapshot: id.clone(),
            files,
        };
        tracing::info!(
            snapshot = %id,
            restored = report.count(|o| matches!(o, RestoreOutcome::Restored)),
            removed = report.count(|o| matches!(o, RestoreOutcome::Removed)),
            failed = report.failures().len(),
            "restored snapshot"
        );
        Ok(report)
    }

    pub fn get(&self, id: &SnapshotId) -> ShipyardResult<Snapshot> {
        read_json(&self.snapshot_dir(id).join(SNAPSHOT_FILE))?
            .ok_or_else(|| ShipyardError::not_found("snapshot", id))
    }

    pub fn exists(&self, id: &SnapshotId) -> bool {
        self.snapshot_dir(id).join(SNAPSHOT_FILE).exists()
    }

    /// Complete snapshots, oldest first.
    pub fn list(&self) -> ShipyardResult<Vec<Snapshot>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<SnapshotId> = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read {}", self.root.display()))?
            .filter_map(Result::ok)
            .filter(|e| e.path().join(SNAPSHOT_FILE).exists())
            .map(|e| SnapshotId::from(e.file_name().to_string_lossy().to_string()))
            .collect();
        ids.sort();
        let mut snapshots = ids
            .iter()
            .map(|id| self.get(id))
            .collect::<ShipyardResult<Vec<_>>>()?;
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(snapshots)
    }

    pub fn delete(&self, id: &SnapshotId) -> ShipyardResult<()> {
        let dir = self.snapshot_dir(id);
        if !dir.exists() {
            return Err(ShipyardError::not_found("snapshot", id));
        }
        fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to delete snapshot {}", dir.display()))?;
        Ok(())
    }

    /// Delete all but the newest `keep` snapshots, never touching `protected`.
    ///
    /// Returns the deleted ids, oldest first.
    pub fn prune(&self, keep: usize, protected: &[SnapshotId]) -> ShipyardResult<Vec<SnapshotId>> {
        let snapshots = self.list()?;
        let excess = snapshots.len().saturating_sub(keep);
        let mut removed = Vec::new();
        for snapshot in snapshots.into_iter().take(excess) {
            if protected.contains(&snapshot.id) {
                continue;
            }
            self.delete(&snapshot.id)?;
            tracing::info!(snapshot = %snapshot.id, "pruned snapshot");
            removed.push(snapshot.id);
        }
        Ok(removed)
    }

    fn snapshot_dir(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.as_str())
    }
}

fn restore_entry(
    state: &EntryState,
    target: &Path,
    files_dir: &Path,
) -> anyhow::Result<RestoreOutcome> {
    match state {
        EntryState::Saved { digest, .. } => {
            let is_file = fs::symlink_metadata(target).is_ok_and(|m| m.is_file());
            if is_file && hash_file(target)? == *digest {
                return Ok(RestoreOutcome::Unchanged);
            }
            let blob = files_dir.join(digest);
            if !blob.exists() {
                anyhow::bail!("saved copy missing from snapshot: {}", blob.display());
            }
            copy_atomic(&blob, target)?;
            Ok(RestoreOutcome::Restored)
        }
        EntryState::Symlink { target: link } => {
            if fs::read_link(target).is_ok_and(|current| current == *link) {
                return Ok(RestoreOutcome::Unchanged);
            }
            restore_symlink(link, target)?;
            Ok(RestoreOutcome::Restored)
        }
        EntryState::Absent => match fs::remove_file(target) {
            Ok(()) => Ok(RestoreOutcome::Removed),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RestoreOutcome::StillAbsent),
            Err(err) => Err(err).with_context(|| format!("Failed to remove {}", target.display())),
        },
    }
}

#[cfg(unix)]
fn restore_symlink(link: &Path, target: &Path) -> anyhow::Result<()> {
    crate::fs::symlink_atomic(link, target)
}

#[cfg(not(unix))]
fn restore_symlink(link: &Path, target: &Path) -> anyhow::Result<()> {
    anyhow::bail!(
        "cannot recreate symlink {} -> {} on this platform",
        target.display(),
        link.display()
    )
}

/// Relative ancestor directories of `relative` that do not exist under `root`.
fn missing_ancestors(root: &Path, relative: &Path) -> Vec<String> {
    let mut missing = Vec::new();
    let mut current = relative.parent();
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() || root.join(dir).exists() {
            break;
        }
        missing.push(dir.to_string_lossy().replace('\\', "/"));
        current = dir.parent();
    }
    missing
}
