//! Deterministic class-file discovery.
//!
//! All directory walks in the engine go through here so that every
//! consumer (hashing, indexing, analysis) sees the same files in the same
//! order: `*.class` files under a root, sorted by relative path.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Collect every `.class` file under `root`, sorted by relative path.
///
/// Symlinks are not followed. A missing or unreadable root yields an empty
/// list; per-entry walk errors are skipped.
pub fn collect_class_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "class"))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Relative path of `file` under `root`, used for hash ordering and
/// package-qualified source lookups.
pub fn relative_path<'a>(root: &Path, file: &'a Path) -> &'a Path {
    file.strip_prefix(root).unwrap_or(file)
}
