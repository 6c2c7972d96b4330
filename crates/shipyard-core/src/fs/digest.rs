//! Content digests for archives, snapshot blobs and deployed trees.
//!
//! All digests are blake3 hex strings (64 chars).

use std::fs;
use std::path::Path;

use anyhow::Context;

/// Stream a file through blake3.
pub fn hash_file(path: &Path) -> anyhow::Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute deterministic tree hash of a directory
///
/// Entries are visited in lexicographic order. Files contribute
/// `relative_path || 0x00 || content`, directories `relative_path || 0xFF`.
/// Symlinks are rejected.
pub fn hash_tree(path: &Path) -> anyhow::Result<String> {
    let mut hasher = blake3::Hasher::new();
    hash_dir_recursive(&mut hasher, path, "")?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_dir_recursive(hasher: &mut blake3::Hasher, dir: &Path, base: &str) -> anyhow::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let rel_path = if base.is_empty() {
            name.to_string_lossy().to_string()
        } else {
            format!("{}/{}", base, name.to_string_lossy())
        };

        let ty = entry
            .file_type()
            .with_context(|| format!("Failed to stat file: {}", entry.path().display()))?;

        if ty.is_dir() {
            hasher.update(rel_path.as_bytes());
            hasher.update(&[0xFF]);
            hash_dir_recursive(hasher, &entry.path(), &rel_path)?;
        } else if ty.is_file() {
            hasher.update(rel_path.as_bytes());
            hasher.update(&[0x00]);
            let mut file = fs::File::open(entry.path())
                .with_context(|| format!("Failed to open file: {}", entry.path().display()))?;
            std::io::copy(&mut file, hasher)
                .with_context(|| format!("Failed to read file: {}", entry.path().display()))?;
        } else {
            anyhow::bail!(
                "Unsupported filesystem entry (symlink or special file): {}",
                entry.path().display()
            );
        }
    }

    Ok(())
}
