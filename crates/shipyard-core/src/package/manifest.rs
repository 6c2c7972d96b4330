//! Package metadata: the optional `package.toml` inside an archive and the
//! file-name fallback (`<name>-<semver>.zip`).

use std::path::Path;

use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE: &str = "package.toml";
pub const DEFAULT_SCRIPT: &str = "deploy.sh";

/// Contents of `package.toml`
///
/// ```toml
/// name = "calendar-ui"
/// version = "1.0.0"
/// description = "Calendar component swap-in"
/// script = "deploy.sh"
/// touches = ["public/index.html"]
/// copy_payload = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Top-level script path inside the archive
    #[serde(default)]
    pub script: Option<String>,

    /// Extra target paths the script writes that are not in the payload
    #[serde(default)]
    pub touches: Vec<String>,

    /// Copy payload files onto the target root before the script runs
    #[serde(default)]
    pub copy_payload: bool,
}

impl PackageManifest {
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("invalid {}: {}", MANIFEST_FILE, e.message()))
    }
}

/// Split `calendar-ui-1.2.0-rc.1.zip` into `("calendar-ui", 1.2.0-rc.1)`.
///
/// The version starts at the first `-` whose remainder parses as semver.
pub fn derive_name_and_version(archive: &Path) -> Option<(String, semver::Version)> {
    let stem = archive.file_name()?.to_str()?.strip_suffix(".zip")?;
    stem.match_indices('-').find_map(|(idx, _)| {
        let (name, rest) = stem.split_at(idx);
        let version = semver::Version::parse(&rest[1..]).ok()?;
        Some((name.to_string(), version))
    })
}

/// Package names become directory names and id prefixes.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("package name is empty".to_string());
    }
    if name.starts_with('.') {
        return Err(format!("package name '{}' may not start with '.'", name));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!(
            "package name '{}' contains invalid character '{}'",
            name, bad
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_name_and_version_from_file_name() {
        let (name, version) = derive_name_and_version(Path::new("/tmp/calendar-ui-1.2.0.zip")).unwrap();
        assert_eq!(name, "calendar-ui");
        assert_eq!(version, semver::Version::new(1, 2, 0));
    }

    #[test]
    fn derives_prerelease_versions() {
        let (name, version) =
            derive_name_and_version(Path::new("emailpilot-2.0.0-rc.1.zip")).unwrap();
        assert_eq!(name, "emailpilot");
        assert_eq!(version.to_string(), "2.0.0-rc.1");
    }

    #[test]
    fn file_name_without_version_is_none() {
        assert!(derive_name_and_version(Path::new("calendar.zip")).is_none());
        assert!(derive_name_and_version(Path::new("calendar-latest.zip")).is_none());
        assert!(derive_name_and_version(Path::new("calendar-1.0.0.tar.gz")).is_none());
    }

    #[test]
    fn manifest_parses_all_fields() {
        let manifest = PackageManifest::from_toml(
            r#"
            name = "calendar-ui"
            version = "1.0.0"
            description = "Calendar swap-in"
            script = "install.sh"
            touches = ["public/config.js"]
            copy_payload = true
            "#,
        )
        .unwrap();
        assert_eq!(manifest.name.as_deref(), Some("calendar-ui"));
        assert_eq!(manifest.script.as_deref(), Some("install.sh"));
        assert_eq!(manifest.touches, vec!["public/config.js"]);
        assert!(manifest.copy_payload);
    }

    #[test]
    fn manifest_rejects_unknown_fields() {
        assert!(PackageManifest::from_toml("entry = \"run.sh\"").is_err());
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("calendar-ui_v2.web").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a@b").is_err());
    }
}
