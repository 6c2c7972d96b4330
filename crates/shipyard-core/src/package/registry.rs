//! Package registry persisted under `<state_dir>/packages`.
//!
//! Layout:
//! - `index.json`: every registered [`Package`], keyed by id
//! - `<name>/<version>.zip`: the stored archive copy

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ShipyardError, ShipyardResult};
use crate::fs::{FileLock, ensure_relative_path, hash_file, read_json, write_json_atomic};
use crate::types::PackageId;

use super::archive::{ArchiveListing, list_archive};
use super::manifest::{DEFAULT_SCRIPT, MANIFEST_FILE, derive_name_and_version, validate_name};

/// A registered deployment package. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub version: semver::Version,
    #[serde(default)]
    pub description: String,
    /// File entries in archive order
    pub contents: Vec<String>,
    /// Deployment script, relative to the archive root
    pub script: String,
    /// Extra target paths the script declares it writes
    #[serde(default)]
    pub touches: Vec<String>,
    #[serde(default)]
    pub copy_payload: bool,
    /// blake3 digest of the stored archive
    pub digest: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Package {
    /// Files that mirror target paths: everything except the script and
    /// the manifest.
    pub fn payload(&self) -> impl Iterator<Item = &str> {
        self.contents
            .iter()
            .map(String::as_str)
            .filter(|path| *path != self.script && *path != MANIFEST_FILE)
    }

    /// Every target-relative path a deployment of this package may write.
    pub fn target_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.payload().map(str::to_string).collect();
        for touched in &self.touches {
            if !paths.contains(touched) {
                paths.push(touched.clone());
            }
        }
        paths
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// Identical archive already stored under this id.
    Unchanged,
}

#[derive(Debug, Serialize, Deserialize)]
struct PackageIndex {
    version: u32,
    packages: BTreeMap<PackageId, Package>,
}

const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct PackageRegistry {
    root: PathBuf,
}

impl PackageRegistry {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate `archive`, copy it into the registry and record its metadata.
    ///
    /// Rejections leave the registry untouched.
    pub fn register(&self, archive: &Path) -> ShipyardResult<(Package, RegisterOutcome)> {
        let listing = list_archive(archive).map_err(|r| ShipyardError::invalid_package(archive, r))?;
        let digest = hash_file(archive)?;
        let package = build_package(archive, listing, digest)?;

        let _lock = FileLock::exclusive(&self.root.join(".index.lock"))?;
        let mut index = self.load_index()?;

        if let Some(existing) = index.packages.get(&package.id) {
            if existing.digest == package.digest {
                tracing::info!(package = %package.id, "package already registered");
                return Ok((existing.clone(), RegisterOutcome::Unchanged));
            }
            return Err(ShipyardError::PackageExists(package.id));
        }

        let stored = self.archive_path(&package);
        if let Some(parent) = stored.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::copy(archive, &stored).with_context(|| {
            format!(
                "Failed to copy {} into registry at {}",
                archive.display(),
                stored.display()
            )
        })?;

        index.packages.insert(package.id.clone(), package.clone());
        self.save_index(&index)?;

        tracing::info!(
            package = %package.id,
            files = package.contents.len(),
            script = %package.script,
            "registered package"
        );
        Ok((package, RegisterOutcome::Registered))
    }

    pub fn get(&self, id: &PackageId) -> ShipyardResult<Package> {
        self.load_index()?
            .packages
            .remove(id)
            .ok_or_else(|| ShipyardError::not_found("package", id))
    }

    /// All packages ordered by name, then version.
    pub fn list(&self) -> ShipyardResult<Vec<Package>> {
        let mut packages: Vec<Package> = self.load_index()?.packages.into_values().collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        Ok(packages)
    }

    /// Stored archive for a registered package.
    pub fn archive_path(&self, package: &Package) -> PathBuf {
        self.root
            .join(&package.name)
            .join(format!("{}.zip", package.version))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn load_index(&self) -> anyhow::Result<PackageIndex> {
        let index: PackageIndex = read_json(&self.index_path())?.unwrap_or(PackageIndex {
            version: INDEX_VERSION,
            packages: BTreeMap::new(),
        });
        if index.version != INDEX_VERSION {
            anyhow::bail!("Unsupported package index version: {}", index.version);
        }
        Ok(index)
    }

    fn save_index(&self, index: &PackageIndex) -> anyhow::Result<()> {
        write_json_atomic(&self.index_path(), index)
    }
}

fn build_package(archive: &Path, listing: ArchiveListing, digest: String) -> ShipyardResult<Package> {
    let invalid = |reason: String| ShipyardError::invalid_package(archive, reason);
    let manifest = listing.manifest.unwrap_or_default();
    let derived = derive_name_and_version(archive);

    let name = match (manifest.name, &derived) {
        (Some(name), _) => name,
        (None, Some((name, _))) => name.clone(),
        (None, None) => {
            return Err(invalid(format!(
                "no name in {} and file name is not <name>-<version>.zip",
                MANIFEST_FILE
            )));
        }
    };
    validate_name(&name).map_err(invalid)?;

    let version = match (manifest.version, derived) {
        (Some(raw), _) => semver::Version::parse(&raw)
            .map_err(|e| invalid(format!("invalid version '{}': {}", raw, e)))?,
        (None, Some((_, version))) => version,
        (None, None) => {
            return Err(invalid(format!(
                "no version in {} and file name is not <name>-<version>.zip",
                MANIFEST_FILE
            )));
        }
    };

    let script = manifest
        .script
        .unwrap_or_else(|| DEFAULT_SCRIPT.to_string());
    if script.contains('/') {
        return Err(invalid(format!(
            "deploy script '{}' must be at the top level of the archive",
            script
        )));
    }
    if !listing.files.iter().any(|f| *f == script) {
        return Err(invalid(format!("missing deploy script '{}'", script)));
    }

    for touched in &manifest.touches {
        ensure_relative_path(Path::new(touched))
            .map_err(|e| invalid(format!("invalid touches entry: {}", e)))?;
    }

    Ok(Package {
        id: PackageId::new(&name, &version),
        name,
        version,
        description: manifest.description.unwrap_or_default(),
        contents: listing.files,
        script,
        touches: manifest.touches,
        copy_payload: manifest.copy_payload,
        digest,
        uploaded_at: Utc::now(),
    })
}
