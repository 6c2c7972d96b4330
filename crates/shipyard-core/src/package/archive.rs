//! Zip archive inspection and extraction.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::manifest::{MANIFEST_FILE, PackageManifest};

/// What registration needs to know about an archive.
#[derive(Debug, Clone)]
pub struct ArchiveListing {
    /// File entries in archive order, `/`-separated, without leading `./`
    pub files: Vec<String>,
    pub manifest: Option<PackageManifest>,
}

/// Read the entry list and `package.toml` without extracting.
///
/// Errors are plain reasons; the caller wraps them as `InvalidPackage`.
pub fn list_archive(path: &Path) -> Result<ArchiveListing, String> {
    let file = File::open(path).map_err(|e| format!("cannot open archive: {}", e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("not a readable zip archive: {}", e))?;

    let mut files = Vec::with_capacity(archive.len());
    let mut seen = HashSet::new();
    let mut manifest = None;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("cannot read zip entry {}: {}", i, e))?;

        if entry.enclosed_name().is_none() {
            return Err(format!("unsafe entry path '{}'", entry.name()));
        }
        if entry.is_dir() {
            continue;
        }

        let name = normalize_entry_name(entry.name());
        if !seen.insert(name.clone()) {
            return Err(format!("duplicate entry '{}'", name));
        }

        if name == MANIFEST_FILE {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| format!("cannot read {}: {}", MANIFEST_FILE, e))?;
            manifest = Some(PackageManifest::from_toml(&content).map_err(|e| e.to_string())?);
        }

        files.push(name);
    }

    Ok(ArchiveListing { files, manifest })
}

fn normalize_entry_name(name: &str) -> String {
    let mut name = name.replace('\\', "/");
    while let Some(rest) = name.strip_prefix("./") {
        name = rest.to_string();
    }
    name
}

/// Extract every entry under `dest`, returning the written file paths.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create extract directory: {}", dest.display()))?;

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip archive: {}", archive_path.display()))?;

    let mut written = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read zip entry {}", i))?;

        let outpath = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => anyhow::bail!("Refusing to extract unsafe entry: {}", entry.name()),
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)
                .with_context(|| format!("Failed to create directory: {}", outpath.display()))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }

        let mut outfile = File::create(&outpath)
            .with_context(|| format!("Failed to create file: {}", outpath.display()))?;
        std::io::copy(&mut entry, &mut outfile)
            .with_context(|| format!("Failed to extract entry: {}", entry.name()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                // Permission bits are advisory; the script runs through `sh`
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode & 0o777)).ok();
            }
        }

        written.push(outpath);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn lists_files_in_archive_order_and_skips_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pkg.zip");
        write_zip(
            &path,
            &[
                ("deploy.sh", "exit 0"),
                ("public/", ""),
                ("public/index.html", "<html>"),
                ("./public/app.js", "app"),
            ],
        );

        let listing = list_archive(&path).unwrap();
        assert_eq!(
            listing.files,
            vec!["deploy.sh", "public/index.html", "public/app.js"]
        );
        assert!(listing.manifest.is_none());
    }

    #[test]
    fn reads_embedded_manifest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pkg.zip");
        write_zip(
            &path,
            &[
                ("package.toml", "name = \"calendar\"\nversion = \"1.0.0\"\n"),
                ("deploy.sh", "exit 0"),
            ],
        );

        let listing = list_archive(&path).unwrap();
        assert_eq!(
            listing.manifest.unwrap().name.as_deref(),
            Some("calendar")
        );
    }

    #[test]
    fn rejects_non_zip_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pkg.zip");
        fs::write(&path, b"not a zip file").unwrap();

        let reason = list_archive(&path).unwrap_err();
        assert!(reason.contains("not a readable zip"));
    }

    #[test]
    fn rejects_traversal_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pkg.zip");
        write_zip(&path, &[("deploy.sh", "exit 0"), ("../escape.txt", "x")]);

        let reason = list_archive(&path).unwrap_err();
        assert!(reason.contains("unsafe entry path"));
    }

    #[test]
    fn extracts_nested_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pkg.zip");
        write_zip(
            &path,
            &[("deploy.sh", "exit 0"), ("public/js/app.js", "console.log(1)")],
        );

        let dest = tmp.path().join("out");
        let written = extract_archive(&path, &dest).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read_to_string(dest.join("public/js/app.js")).unwrap(),
            "console.log(1)"
        );
    }
}
