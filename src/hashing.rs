//! Package content hashing.
//!
//! A package's identity for cache invalidation is the SHA-256 over the
//! byte concatenation of all its `.class` files, visited in sorted
//! relative-path order. Any byte change, file addition, or file removal
//! changes the digest.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::scan::collect_class_files;

/// Hex SHA-256 digest of the class files under `classes_dir`.
///
/// An empty or missing directory hashes to the digest of the empty byte
/// string, which still participates in skip-vs-rebuild decisions.
pub fn hash_package_classes(classes_dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for file in collect_class_files(classes_dir) {
        let bytes = std::fs::read(&file)
            .with_context(|| format!("failed to read class file {}", file.display()))?;
        hasher.update(&bytes);
    }
    Ok(hex::encode(hasher.finalize()))
}
