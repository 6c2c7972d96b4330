use std::path::PathBuf;
use std::time::Duration;

use shipyard_core::config::{ConfigStore, Overrides};
use shipyard_core::error::ShipyardError;
use tempfile::TempDir;

fn write(path: &std::path::Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn missing_layers_resolve_to_defaults() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_paths(temp.path().join("config"), temp.path().join("project"));
    let overrides = Overrides {
        state_dir: Some(temp.path().join("state")),
        ..Overrides::default()
    };

    let settings = store.resolve(&overrides).unwrap();
    assert!(settings.target_root.is_none());
    assert_eq!(settings.state_dir, temp.path().join("state"));
    assert_eq!(settings.script_timeout, Duration::from_secs(300));
    assert_eq!(settings.probe_timeout, Duration::from_secs(5));
    assert!(settings.endpoints.is_empty());
    assert!(!settings.auto_rollback);
    assert_eq!(settings.keep_snapshots, 10);
}

#[test]
fn project_layer_overrides_global_key_by_key() {
    let temp = TempDir::new().unwrap();
    let global = temp.path().join("config");
    let project = temp.path().join("project");
    write(
        &global.join("shipyard.toml"),
        r#"
state_dir = "/var/lib/shipyard"

[deploy]
script_timeout_secs = 120

[verify]
timeout_secs = 3
endpoints = ["https://global.example.com/health"]
"#,
    );
    write(
        &project.join("shipyard.toml"),
        r#"
target_root = "site"

[verify]
endpoints = ["https://app.example.com/health", "http://localhost:8080/ready"]
auto_rollback = true
"#,
    );

    let store = ConfigStore::from_paths(global, project.clone());
    let settings = store.resolve(&Overrides::default()).unwrap();

    assert_eq!(settings.state_dir, PathBuf::from("/var/lib/shipyard"));
    assert_eq!(settings.target_root, Some(project.join("site")));
    assert_eq!(settings.script_timeout, Duration::from_secs(120));
    assert_eq!(settings.probe_timeout, Duration::from_secs(3));
    assert_eq!(settings.endpoints.len(), 2);
    assert_eq!(settings.endpoints[0].as_str(), "https://app.example.com/health");
    assert!(settings.auto_rollback);
}

#[test]
fn command_line_overrides_beat_files() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    write(
        &project.join("shipyard.toml"),
        "target_root = \"/srv/from-file\"\nstate_dir = \"/var/lib/from-file\"\n",
    );

    let store = ConfigStore::from_paths(temp.path().join("config"), project);
    let settings = store
        .resolve(&Overrides {
            target_root: Some(PathBuf::from("/srv/from-flag")),
            state_dir: Some(PathBuf::from("/tmp/state")),
        })
        .unwrap();

    assert_eq!(settings.target_root, Some(PathBuf::from("/srv/from-flag")));
    assert_eq!(settings.state_dir, PathBuf::from("/tmp/state"));
}

#[test]
fn invalid_values_are_config_errors() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("project");
    let store = ConfigStore::from_paths(temp.path().join("config"), project.clone());

    write(&project.join("shipyard.toml"), "[verify]\nendpoints = [\"ftp://example.com\"]\n");
    let err = store.resolve(&Overrides::default()).unwrap_err();
    assert!(matches!(err, ShipyardError::Config(_)));

    write(&project.join("shipyard.toml"), "[deploy]\nscript_timeout_secs = 0\n");
    let err = store.load().unwrap_err();
    assert!(matches!(err, ShipyardError::Config(_)));

    write(&project.join("shipyard.toml"), "unknown_key = 1\n");
    let err = store.load().unwrap_err();
    assert!(matches!(err, ShipyardError::Config(_)));
}

#[test]
fn explicit_config_file_must_exist() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_file(temp.path().join("missing.toml"));
    let err = store.load().unwrap_err();
    assert!(err.to_string().contains("config file not found"));
}
