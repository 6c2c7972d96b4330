mod support;

use shipyard_core::error::ShipyardError;
use shipyard_core::package::{PackageRegistry, RegisterOutcome};
use shipyard_core::types::PackageId;
use support::write_package;
use tempfile::TempDir;

#[test]
fn register_then_get_returns_declared_contents() {
    let temp = TempDir::new().unwrap();
    let registry = PackageRegistry::new(temp.path().join("packages"));
    let archive = write_package(
        &temp.path().join("uploads"),
        "site-1.2.0.zip",
        &[
            ("deploy.sh", "exit 0\n"),
            ("public/index.html", "<h1>v1.2</h1>"),
            ("public/app.js", "console.log(1)"),
        ],
    );

    let (package, outcome) = registry.register(&archive).unwrap();
    assert_eq!(outcome, RegisterOutcome::Registered);
    assert_eq!(package.id, PackageId::from("site@1.2.0"));

    let fetched = registry.get(&package.id).unwrap();
    assert_eq!(fetched, package);
    assert_eq!(
        fetched.contents,
        vec!["deploy.sh", "public/index.html", "public/app.js"]
    );
    assert_eq!(fetched.script, "deploy.sh");
    assert!(registry.archive_path(&fetched).is_file());
}

#[test]
fn manifest_overrides_file_name_metadata() {
    let temp = TempDir::new().unwrap();
    let registry = PackageRegistry::new(temp.path().join("packages"));
    let archive = write_package(
        &temp.path().join("uploads"),
        "bundle.zip",
        &[
            (
                "package.toml",
                "name = \"api\"\nversion = \"2.0.0\"\nscript = \"install.sh\"\ncopy_payload = true\n",
            ),
            ("install.sh", "exit 0\n"),
            ("etc/api.conf", "port = 80"),
        ],
    );

    let (package, _) = registry.register(&archive).unwrap();
    assert_eq!(package.id, PackageId::from("api@2.0.0"));
    assert_eq!(package.script, "install.sh");
    assert!(package.copy_payload);
    assert_eq!(package.target_paths(), vec!["etc/api.conf"]);
}

#[test]
fn reupload_is_idempotent_but_content_is_immutable() {
    let temp = TempDir::new().unwrap();
    let registry = PackageRegistry::new(temp.path().join("packages"));
    let uploads = temp.path().join("uploads");

    let first = write_package(&uploads, "site-1.0.0.zip", &[("deploy.sh", "exit 0\n")]);
    registry.register(&first).unwrap();
    let (_, outcome) = registry.register(&first).unwrap();
    assert_eq!(outcome, RegisterOutcome::Unchanged);

    let other_dir = temp.path().join("other");
    let changed = write_package(&other_dir, "site-1.0.0.zip", &[("deploy.sh", "exit 1\n")]);
    let err = registry.register(&changed).unwrap_err();
    assert!(matches!(err, ShipyardError::PackageExists(_)));
    assert_eq!(registry.list().unwrap().len(), 1);
}

#[test]
fn rejected_archive_leaves_registry_untouched() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("packages");
    let registry = PackageRegistry::new(root.clone());
    let uploads = temp.path().join("uploads");

    let no_script = write_package(&uploads, "site-1.0.0.zip", &[("index.html", "hi")]);
    let err = registry.register(&no_script).unwrap_err();
    assert!(matches!(err, ShipyardError::InvalidPackage { .. }));
    assert_eq!(err.exit_code(), 2);

    let bad_version = write_package(&uploads, "site-latest.zip", &[("deploy.sh", "exit 0\n")]);
    let err = registry.register(&bad_version).unwrap_err();
    assert!(matches!(err, ShipyardError::InvalidPackage { .. }));

    let not_zip = uploads.join("site-3.0.0.zip");
    std::fs::write(&not_zip, b"plain text").unwrap();
    let err = registry.register(&not_zip).unwrap_err();
    assert!(matches!(err, ShipyardError::InvalidPackage { .. }));

    assert!(registry.list().unwrap().is_empty());
    assert!(!root.join("site").exists());
}

#[test]
fn list_orders_by_name_then_version() {
    let temp = TempDir::new().unwrap();
    let registry = PackageRegistry::new(temp.path().join("packages"));
    let uploads = temp.path().join("uploads");
    for name in ["web-1.10.0.zip", "api-1.0.0.zip", "web-1.9.0.zip"] {
        let archive = write_package(&uploads, name, &[("deploy.sh", "exit 0\n")]);
        registry.register(&archive).unwrap();
    }

    let ids: Vec<String> = registry
        .list()
        .unwrap()
        .into_iter()
        .map(|p| p.id.to_string())
        .collect();
    assert_eq!(ids, vec!["api@1.0.0", "web@1.9.0", "web@1.10.0"]);
}

#[test]
fn unknown_package_is_not_found() {
    let temp = TempDir::new().unwrap();
    let registry = PackageRegistry::new(temp.path().join("packages"));
    let err = registry.get(&PackageId::from("ghost@0.1.0")).unwrap_err();
    assert_eq!(err.exit_code(), 7);
}
