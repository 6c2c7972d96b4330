use shipyard_core::backup::{BackupManager, RestoreOutcome};
use shipyard_core::fs::hash_tree;
use tempfile::TempDir;

fn seed(root: &std::path::Path) {
    std::fs::create_dir_all(root.join("public/css")).unwrap();
    std::fs::write(root.join("public/index.html"), "<h1>v0</h1>").unwrap();
    std::fs::write(root.join("public/css/site.css"), "body {}").unwrap();
    std::fs::write(root.join("README"), "untouched").unwrap();
}

fn paths() -> Vec<String> {
    vec![
        "public/index.html".to_string(),
        "public/css/site.css".to_string(),
        "public/js/app.js".to_string(),
    ]
}

#[test]
fn restore_without_writes_leaves_tree_identical() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("srv");
    seed(&target);
    let before = hash_tree(&target).unwrap();

    let backups = BackupManager::new(temp.path().join("snapshots"));
    let snapshot = backups.snapshot(&target, &paths()).unwrap();
    let report = backups.restore(&snapshot.id).unwrap();

    assert!(report.is_success());
    assert_eq!(hash_tree(&target).unwrap(), before);
    assert_eq!(report.count(|o| matches!(o, RestoreOutcome::Unchanged)), 2);
    assert_eq!(report.count(|o| matches!(o, RestoreOutcome::StillAbsent)), 1);
}

#[test]
fn restore_undoes_overwrites_and_new_files() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("srv");
    seed(&target);
    let before = hash_tree(&target).unwrap();

    let backups = BackupManager::new(temp.path().join("snapshots"));
    let snapshot = backups.snapshot(&target, &paths()).unwrap();
    assert_eq!(snapshot.saved_count(), 2);
    assert_eq!(snapshot.absent_count(), 1);

    std::fs::write(target.join("public/index.html"), "<h1>v1</h1>").unwrap();
    std::fs::remove_file(target.join("public/css/site.css")).unwrap();
    std::fs::create_dir_all(target.join("public/js")).unwrap();
    std::fs::write(target.join("public/js/app.js"), "new").unwrap();

    let report = backups.restore(&snapshot.id).unwrap();
    assert!(report.is_success());
    assert_eq!(report.count(|o| matches!(o, RestoreOutcome::Restored)), 2);
    assert_eq!(report.count(|o| matches!(o, RestoreOutcome::Removed)), 1);
    assert!(!target.join("public/js").exists());
    assert_eq!(hash_tree(&target).unwrap(), before);
}

#[test]
fn snapshots_survive_reopening_the_manager() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("srv");
    seed(&target);

    let first = BackupManager::new(temp.path().join("snapshots"));
    let snapshot = first.snapshot(&target, &paths()).unwrap();

    let reopened = BackupManager::new(temp.path().join("snapshots"));
    let loaded = reopened.get(&snapshot.id).unwrap();
    assert_eq!(loaded, snapshot);
    assert_eq!(reopened.list().unwrap().len(), 1);
}

#[test]
fn snapshot_rejects_escaping_paths() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("srv");
    seed(&target);

    let backups = BackupManager::new(temp.path().join("snapshots"));
    assert!(backups
        .snapshot(&target, &["../etc/passwd".to_string()])
        .is_err());
    assert!(backups.list().unwrap().is_empty());
}
