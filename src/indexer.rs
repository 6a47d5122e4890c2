//! Symbol index builder.
//!
//! Maintains `symbol_index` so every class and method FQN resolves to its
//! owning package, source URI, and definition line. Per package the flow
//! is: content-hash the classes tree, skip when the stored hash matches,
//! otherwise decode through the analysis service and atomically replace
//! the package's rows (cascade delete + upserts + metadata in one
//! transaction). After the commit the tree is re-hashed; a mismatch means
//! the corpus changed underneath the run and aborts it.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::client::AnalyzerClient;
use crate::error::EngineError;
use crate::hashing::hash_package_classes;
use crate::package::PackageSpec;
use crate::scan::{collect_class_files, relative_path};
use crate::service::protocol::IndexRecord;
use crate::store::{Store, SymbolRow};

/// Class files per `/index/batch` request.
pub const INDEX_CHUNK_CLASSES: usize = 500;

/// Result of indexing one package.
#[derive(Debug, Clone, Default)]
pub struct IndexOutcome {
    /// The stored hash matched; nothing was touched.
    pub skipped: bool,
    pub symbols_written: usize,
    pub collisions: usize,
    pub decode_failures: usize,
    pub enums_skipped: usize,
}

/// Index one package, returning what happened.
///
/// Errors are package-level (`AnalyzerUnavailable`, I/O) except for
/// [`EngineError::HashMismatch`], which the orchestrator treats as fatal
/// to the run.
pub fn index_package(
    store: &mut Store,
    client: &AnalyzerClient,
    spec: &PackageSpec,
) -> Result<IndexOutcome> {
    let hash = hash_package_classes(&spec.classes_dir)?;
    if store.metadata_hash(&spec.name)?.as_deref() == Some(hash.as_str()) {
        debug!(package = %spec.name, "content hash unchanged, skipping");
        return Ok(IndexOutcome {
            skipped: true,
            ..Default::default()
        });
    }

    let class_files = collect_class_files(&spec.classes_dir);
    let resolver = SourceResolver::new(spec);

    let mut symbols: Vec<SymbolRow> = Vec::new();
    let mut outcome = IndexOutcome::default();

    for chunk in class_files.chunks(INDEX_CHUNK_CLASSES) {
        let records = client.index_batch(chunk)?;
        for (class_file, record) in chunk.iter().zip(records) {
            collect_symbols(&resolver, class_file, record, &mut symbols, &mut outcome);
        }
    }

    let indexed_at = chrono::Utc::now().timestamp();
    let write = store.replace_package_symbols(&spec.name, &hash, indexed_at, &symbols)?;
    outcome.symbols_written = write.written;
    outcome.collisions = write.collisions;

    // The hash was computed before decoding; verify the tree did not move
    // underneath the run before trusting the metadata row.
    let actual = hash_package_classes(&spec.classes_dir)?;
    if actual != hash {
        return Err(EngineError::HashMismatch {
            package: spec.name.clone(),
            recorded: hash,
            actual,
        }
        .into());
    }

    info!(
        package = %spec.name,
        symbols = outcome.symbols_written,
        collisions = outcome.collisions,
        failures = outcome.decode_failures,
        "package indexed"
    );
    Ok(outcome)
}

fn collect_symbols(
    resolver: &SourceResolver<'_>,
    class_file: &Path,
    record: IndexRecord,
    symbols: &mut Vec<SymbolRow>,
    outcome: &mut IndexOutcome,
) {
    if !record.success {
        outcome.decode_failures += 1;
        return;
    }
    if record.skipped {
        outcome.enums_skipped += 1;
        return;
    }

    let source_uri = resolver.uri_for(class_file);
    let is_entity = record.is_entity;
    for symbol in record.symbols {
        let uri = match symbol.line {
            Some(line) if symbol.node_type == "method" => format!("{}:{}", source_uri, line),
            _ => source_uri.clone(),
        };
        symbols.push(SymbolRow {
            fqn: symbol.fqn,
            uri,
            line: symbol.line,
            // The entity flag is a class-level heuristic; methods stay null.
            is_entity: if symbol.node_type == "method" {
                None
            } else {
                is_entity
            },
        });
    }
}

/// Resolves a class file to its preferred source location and renders
/// `file:///` URIs, applying the local-package rewrite when configured.
struct SourceResolver<'a> {
    spec: &'a PackageSpec,
}

impl<'a> SourceResolver<'a> {
    fn new(spec: &'a PackageSpec) -> Self {
        Self { spec }
    }

    fn uri_for(&self, class_file: &Path) -> String {
        let path = self.resolve_source(class_file);
        let path = self.rewrite_local(&path);
        file_uri(&path)
    }

    /// Prefer the `.java` file matching the class's top-level type by
    /// package/name convention; fall back to the `.class` file.
    fn resolve_source(&self, class_file: &Path) -> PathBuf {
        let Some(sources_dir) = &self.spec.sources_dir else {
            return class_file.to_path_buf();
        };
        let rel = relative_path(&self.spec.classes_dir, class_file);
        let Some(java_rel) = source_relative_path(rel) else {
            return class_file.to_path_buf();
        };
        let candidate = sources_dir.join(java_rel);
        if candidate.is_file() {
            candidate
        } else {
            class_file.to_path_buf()
        }
    }

    /// For local packages, substitute the cache-root prefix with the
    /// project source tree. Applies to symbol URIs only.
    fn rewrite_local(&self, path: &Path) -> PathBuf {
        if !self.spec.is_local {
            return path.to_path_buf();
        }
        let Some(project_root) = &self.spec.project_source_root else {
            return path.to_path_buf();
        };
        if let Some(sources_dir) = &self.spec.sources_dir {
            if let Ok(rel) = path.strip_prefix(sources_dir) {
                return project_root.join(rel);
            }
        }
        if let Ok(rel) = path.strip_prefix(&self.spec.classes_dir) {
            return project_root.join(rel);
        }
        path.to_path_buf()
    }
}

/// `com/ex/Outer$Inner.class` -> `com/ex/Outer.java`.
fn source_relative_path(class_rel: &Path) -> Option<PathBuf> {
    let stem = class_rel.file_stem()?.to_str()?;
    let top_level = stem.split('$').next()?;
    Some(class_rel.with_file_name(format!("{}.java", top_level)))
}

/// Render an absolute `file:///` URI with forward slashes.
fn file_uri(path: &Path) -> String {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = absolute.to_string_lossy().replace('\\', "/");
    if let Some(rest) = text.strip_prefix('/') {
        format!("file:///{}", rest)
    } else {
        format!("file:///{}", text)
    }
}
