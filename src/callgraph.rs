//! Call-graph builder.
//!
//! For each package: enumerate class files, fetch grouped analysis records
//! from the service in bounded chunks, rebuild the flat node/edge stream,
//! resolve edge targets to their owning packages through `symbol_index`,
//! and persist in batched transactions. Requests are fetched by a small
//! worker pool; all writes stay on the calling thread, which owns the
//! single store connection. Results are applied in chunk order, so row
//! order is deterministic regardless of fetch interleaving.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;

use anyhow::Result;
use tracing::{debug, info};

use crate::client::AnalyzerClient;
use crate::error::EngineError;
use crate::facts::{self, Edge, Node};
use crate::package::PackageSpec;
use crate::scan::collect_class_files;
use crate::service::protocol::{AnalyzeResponse, AnalyzedClass};
use crate::store::{EdgeRow, Store, BATCH_ROWS, UNKNOWN_PACKAGE};

/// Class files per `/analyze` request; bounds request payload size.
pub const ANALYZE_CHUNK_CLASSES: usize = 200;

/// Concurrent in-flight analyze requests per package.
const REQUEST_WORKERS: usize = 4;

/// Result of analyzing one package.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOutcome {
    pub classes: usize,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub decode_failures: usize,
}

/// Per-run memo of `fqn -> owning package`.
///
/// Safe to reuse across packages because the analysis phase only starts
/// after every `symbol_index` write has committed; the index is immutable
/// underneath it. Misses are memoized as [`UNKNOWN_PACKAGE`].
#[derive(Debug, Default)]
pub struct PackageResolver {
    cache: HashMap<String, String>,
}

impl PackageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a batch of FQNs with a single grouped store lookup for the
    /// ones not yet cached.
    fn resolve_all<'a>(
        &mut self,
        store: &Store,
        fqns: impl Iterator<Item = &'a str>,
    ) -> Result<()> {
        let missing: Vec<String> = fqns
            .filter(|fqn| !self.cache.contains_key(*fqn))
            .map(str::to_string)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let resolved = store.lookup_packages(&missing)?;
        for fqn in missing {
            let package = resolved
                .get(&fqn)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_PACKAGE.to_string());
            self.cache.insert(fqn, package);
        }
        Ok(())
    }

    fn get(&self, fqn: &str) -> &str {
        self.cache
            .get(fqn)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_PACKAGE)
    }
}

/// Analyze one package and persist its facts.
///
/// The caller guarantees the symbol index is complete; edges written here
/// never trigger further index writes.
pub fn analyze_package(
    store: &mut Store,
    client: &AnalyzerClient,
    spec: &PackageSpec,
    domains: &[String],
    limit: Option<usize>,
    resolver: &mut PackageResolver,
    cancel: &AtomicBool,
) -> Result<AnalyzeOutcome> {
    let mut class_files = collect_class_files(&spec.classes_dir);
    if let Some(limit) = limit {
        class_files.truncate(limit);
    }

    let chunks: Vec<&[PathBuf]> = class_files.chunks(ANALYZE_CHUNK_CLASSES).collect();
    let mut outcome = AnalyzeOutcome::default();
    let mut edge_buffer: Vec<Edge> = Vec::new();

    let next_chunk = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<(usize, Result<AnalyzeResponse, EngineError>)>();

    std::thread::scope(|scope| {
        let workers = REQUEST_WORKERS.min(chunks.len()).max(1);
        for _ in 0..workers {
            let tx = tx.clone();
            let chunks = &chunks;
            let next_chunk = &next_chunk;
            let abort = &abort;
            scope.spawn(move || loop {
                if cancel.load(Ordering::Relaxed) || abort.load(Ordering::Relaxed) {
                    break;
                }
                let index = next_chunk.fetch_add(1, Ordering::Relaxed);
                if index >= chunks.len() {
                    break;
                }
                let result = client.analyze(chunks[index], domains);
                if tx.send((index, result)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        let mut write_in_order = || -> Result<()> {
            let mut pending: BTreeMap<usize, Result<AnalyzeResponse, EngineError>> =
                BTreeMap::new();
            let mut applied = 0usize;
            while applied < chunks.len() {
                if cancel.load(Ordering::Relaxed) {
                    return Err(EngineError::Cancelled.into());
                }
                let (index, result) = match rx.recv() {
                    Ok(message) => message,
                    Err(_) if cancel.load(Ordering::Relaxed) => {
                        return Err(EngineError::Cancelled.into())
                    }
                    Err(_) => anyhow::bail!("analysis worker exited without a result"),
                };
                pending.insert(index, result);

                while let Some(result) = pending.remove(&applied) {
                    let response = result?;
                    apply_chunk(store, spec, resolver, response, &mut edge_buffer, &mut outcome)?;
                    applied += 1;
                }
            }
            Ok(())
        };

        let written = write_in_order();
        if written.is_err() {
            // Stop the fetchers; in-flight requests finish and are dropped.
            abort.store(true, Ordering::Relaxed);
        }
        written
    })?;

    // Final flush; commits at the package boundary.
    outcome.edges_written += flush_edges(store, spec, resolver, &mut edge_buffer)?;

    info!(
        package = %spec.name,
        classes = outcome.classes,
        nodes = outcome.nodes_written,
        edges = outcome.edges_written,
        failures = outcome.decode_failures,
        "package analyzed"
    );
    Ok(outcome)
}

/// Apply one chunk's grouped records: nodes first so every edge written
/// afterwards has its `from_fqn` row in place, then buffered edges.
fn apply_chunk(
    store: &mut Store,
    spec: &PackageSpec,
    resolver: &mut PackageResolver,
    response: AnalyzeResponse,
    edge_buffer: &mut Vec<Edge>,
    outcome: &mut AnalyzeOutcome,
) -> Result<()> {
    outcome.decode_failures += response.failures.len();

    let mut nodes: Vec<Node> = Vec::new();
    for class in &response.classes {
        let (class_nodes, class_edges) = rebuild_facts(class);
        nodes.extend(class_nodes);
        edge_buffer.extend(class_edges);
    }
    outcome.classes += response.classes.len();
    outcome.nodes_written += store.upsert_nodes(&spec.name, &nodes)?;

    while edge_buffer.len() >= BATCH_ROWS {
        let batch: Vec<Edge> = edge_buffer.drain(..BATCH_ROWS).collect();
        outcome.edges_written += flush_edge_batch(store, spec, resolver, &batch)?;
    }
    Ok(())
}

fn flush_edges(
    store: &mut Store,
    spec: &PackageSpec,
    resolver: &mut PackageResolver,
    edge_buffer: &mut Vec<Edge>,
) -> Result<usize> {
    if edge_buffer.is_empty() {
        return Ok(0);
    }
    let batch: Vec<Edge> = edge_buffer.drain(..).collect();
    flush_edge_batch(store, spec, resolver, &batch)
}

fn flush_edge_batch(
    store: &mut Store,
    spec: &PackageSpec,
    resolver: &mut PackageResolver,
    batch: &[Edge],
) -> Result<usize> {
    resolver.resolve_all(store, batch.iter().map(|e| e.to_fqn.as_str()))?;

    let rows: Vec<EdgeRow> = batch
        .iter()
        .map(|edge| EdgeRow {
            from_fqn: edge.from_fqn.clone(),
            edge_type: edge.edge_type.clone(),
            to_fqn: edge.to_fqn.clone(),
            kind: edge.kind.clone(),
            from_package: spec.name.clone(),
            to_package: resolver.get(&edge.to_fqn).to_string(),
            from_line: edge.from_line,
        })
        .collect();

    let written = store.insert_edges(&rows)?;
    debug!(package = %spec.name, rows = written, "flushed edge batch");
    Ok(written)
}

/// Rebuild the flat fact stream from a grouped analysis record, in the
/// emitter's order: inheritance, field types, then per method its
/// membership, return, argument, and call edges.
fn rebuild_facts(class: &AnalyzedClass) -> (Vec<Node>, Vec<Edge>) {
    let mut nodes = Vec::with_capacity(class.methods.len() + 1);
    let mut edges = Vec::new();

    nodes.push(Node {
        fqn: class.fqn.clone(),
        node_type: class.node_type.clone(),
        line: None,
        visibility: class.visibility.clone(),
        has_override: false,
        is_transactional: false,
    });

    for inherit in &class.inheritance {
        edges.push(Edge {
            from_fqn: class.fqn.clone(),
            edge_type: facts::EDGE_INHERITANCE.to_string(),
            to_fqn: inherit.target.clone(),
            kind: inherit.kind.clone(),
            from_line: None,
        });
    }

    for field in &class.fields {
        edges.push(Edge {
            from_fqn: field.type_fqn.clone(),
            edge_type: facts::EDGE_MEMBER_OF.to_string(),
            to_fqn: class.fqn.clone(),
            kind: facts::KIND_CLASS.to_string(),
            from_line: None,
        });
    }

    for method in &class.methods {
        nodes.push(Node {
            fqn: method.fqn.clone(),
            node_type: "method".to_string(),
            line: Some(method.line),
            visibility: method.visibility.clone(),
            has_override: method.has_override,
            is_transactional: method.is_transactional,
        });

        edges.push(Edge {
            from_fqn: method.fqn.clone(),
            edge_type: facts::EDGE_MEMBER_OF.to_string(),
            to_fqn: class.fqn.clone(),
            kind: facts::KIND_METHOD.to_string(),
            from_line: None,
        });

        if let Some(return_type) = &method.return_type {
            edges.push(Edge {
                from_fqn: return_type.clone(),
                edge_type: facts::EDGE_MEMBER_OF.to_string(),
                to_fqn: method.fqn.clone(),
                kind: facts::KIND_RETURN.to_string(),
                from_line: None,
            });
        }

        for argument in &method.arguments {
            edges.push(Edge {
                from_fqn: argument.clone(),
                edge_type: facts::EDGE_MEMBER_OF.to_string(),
                to_fqn: method.fqn.clone(),
                kind: facts::KIND_ARGUMENT.to_string(),
                from_line: None,
            });
        }

        for call in &method.calls {
            edges.push(Edge {
                from_fqn: method.fqn.clone(),
                edge_type: facts::EDGE_CALL.to_string(),
                to_fqn: call.target_fqn.clone(),
                kind: call.kind.clone(),
                from_line: Some(call.line),
            });
        }
    }

    (nodes, edges)
}
