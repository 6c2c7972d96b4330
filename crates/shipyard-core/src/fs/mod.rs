//! Filesystem primitives shared by the registry, backup and deploy layers.

pub mod atomic;
pub mod digest;
pub mod lock;
pub mod paths;

pub use atomic::{copy_atomic, read_json, write_atomic, write_json_atomic};
#[cfg(unix)]
pub use atomic::symlink_atomic;
pub use digest::{hash_file, hash_tree};
pub use lock::FileLock;
pub use paths::{ensure_relative_path, resolve_under};
