//! Deployment packages: zip archives carrying a deploy script plus payload
//! files that mirror target paths.

pub mod archive;
pub mod manifest;
pub mod registry;

pub use archive::{ArchiveListing, extract_archive, list_archive};
pub use manifest::{DEFAULT_SCRIPT, MANIFEST_FILE, PackageManifest};
pub use registry::{Package, PackageRegistry, RegisterOutcome};
