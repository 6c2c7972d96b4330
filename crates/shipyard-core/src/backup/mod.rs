//! Backup manager: captures the files a deployment is about to overwrite and
//! puts them back on rollback.

pub mod manager;
pub mod snapshot;

pub use manager::BackupManager;
pub use snapshot::{EntryState, FileRestore, RestoreOutcome, RestoreReport, Snapshot, SnapshotEntry};
