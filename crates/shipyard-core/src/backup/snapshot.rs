//! Snapshot and restore report types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SnapshotId;

/// Pre-deployment state of a set of target paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub created_at: DateTime<Utc>,
    pub target_root: PathBuf,
    pub entries: Vec<SnapshotEntry>,
    /// Ancestor directories of absent entries that did not exist either,
    /// deepest first. Restore removes them again when empty.
    #[serde(default)]
    pub absent_dirs: Vec<String>,
}

impl Snapshot {
    pub fn saved_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !matches!(e.state, EntryState::Absent))
            .count()
    }

    pub fn absent_count(&self) -> usize {
        self.entries.len() - self.saved_count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Path relative to the target root
    pub path: String,
    #[serde(flatten)]
    pub state: EntryState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum EntryState {
    /// File existed; its bytes are stored as blob `digest`.
    Saved { digest: String, size: u64 },
    /// Path was a symlink; restore points it back at `target`.
    Symlink { target: PathBuf },
    /// File did not exist; restore deletes it.
    Absent,
}

/// Result of restoring one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RestoreOutcome {
    /// Saved bytes written back.
    Restored,
    /// Current content already matched the saved bytes.
    Unchanged,
    /// File introduced after the snapshot was deleted.
    Removed,
    /// File was absent before and still is.
    StillAbsent,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRestore {
    pub path: String,
    #[serde(flatten)]
    pub outcome: RestoreOutcome,
}

/// Per-file restore results, in snapshot entry order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub snapshot: SnapshotId,
    pub files: Vec<FileRestore>,
}

impl RestoreReport {
    pub fn is_success(&self) -> bool {
        self.files
            .iter()
            .all(|f| !matches!(f.outcome, RestoreOutcome::Failed { .. }))
    }

    /// `path: message` for every failed file.
    pub fn failures(&self) -> Vec<String> {
        self.files
            .iter()
            .filter_map(|f| match &f.outcome {
                RestoreOutcome::Failed { message } => Some(format!("{}: {}", f.path, message)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&RestoreOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_state_serializes_flat() {
        let entry = SnapshotEntry {
            path: "public/index.html".into(),
            state: EntryState::Saved {
                digest: "abc".into(),
                size: 3,
            },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["state"], "saved");
        assert_eq!(json["path"], "public/index.html");
        assert_eq!(json["size"], 3);

        let absent = serde_json::to_value(SnapshotEntry {
            path: "new.js".into(),
            state: EntryState::Absent,
        })
        .unwrap();
        assert_eq!(absent["state"], "absent");
    }

    #[test]
    fn report_collects_failures() {
        let report = RestoreReport {
            snapshot: SnapshotId::from("s-1"),
            files: vec![
                FileRestore {
                    path: "a".into(),
                    outcome: RestoreOutcome::Restored,
                },
                FileRestore {
                    path: "b".into(),
                    outcome: RestoreOutcome::Failed {
                        message: "denied".into(),
                    },
                },
            ],
        };
        assert!(!report.is_success());
        assert_eq!(report.failures(), vec!["b: denied"]);
        assert_eq!(report.count(|o| matches!(o, RestoreOutcome::Restored)), 1);
    }
}
