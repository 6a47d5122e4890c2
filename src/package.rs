//! Package inputs.
//!
//! A package is the unit of caching and invalidation: one compiled library
//! version with an unpacked classes tree and, optionally, an unpacked
//! sources tree. Discovery of packages (build-tool interrogation, JAR
//! extraction) is a caller concern; the engine consumes ready specs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Unique package name, e.g. `axelor-core-7.2.6`.
    pub name: String,
    /// Root of the unpacked `.class` tree.
    pub classes_dir: PathBuf,
    /// Root of the unpacked `.java` tree, when a sources archive exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_dir: Option<PathBuf>,
    /// Part of the project under analysis (enables URI rewriting).
    #[serde(default)]
    pub is_local: bool,
    /// Source tree that local-package URIs are rewritten into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_source_root: Option<PathBuf>,
}

impl PackageSpec {
    pub fn new(name: &str, classes_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            classes_dir: classes_dir.into(),
            sources_dir: None,
            is_local: false,
            project_source_root: None,
        }
    }

    pub fn with_sources(mut self, sources_dir: impl Into<PathBuf>) -> Self {
        self.sources_dir = Some(sources_dir.into());
        self
    }
}

/// Load a package manifest: a JSON array of [`PackageSpec`]s.
pub fn load_manifest(path: &Path) -> Result<Vec<PackageSpec>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read package manifest {}", path.display()))?;
    let specs: Vec<PackageSpec> = serde_json::from_str(&contents)
        .with_context(|| format!("invalid package manifest {}", path.display()))?;
    Ok(specs)
}
