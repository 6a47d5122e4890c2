//! Run pipeline.
//!
//! Sequences a full run: open the store, bring the symbol index up to date
//! for every package, then build the call graph for every package that
//! changed. Indexing all packages strictly before analyzing any is what
//! makes cross-package FQN resolution complete. Per-package failures are
//! recorded and skipped over; hash mismatches and cancellation abort the
//! run with completed packages left intact.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{info, warn};

use crate::callgraph::{analyze_package, PackageResolver};
use crate::client::{default_base_url, AnalyzerClient};
use crate::error::EngineError;
use crate::indexer::index_package;
use crate::package::PackageSpec;
use crate::store::Store;

/// Pause before the health probe's single retry.
const HEALTH_RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Drop and recreate all tables before the run.
    pub init: bool,
    pub analyzer_url: String,
    /// FQN prefixes restricting which classes are analyzed. Empty keeps
    /// everything.
    pub domains: Vec<String>,
    /// Cap on classes per package; test runs only, requires `init`.
    pub limit: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            init: false,
            analyzer_url: default_base_url(),
            domains: Vec::new(),
            limit: None,
        }
    }
}

/// Per-package outcome for the run summary.
#[derive(Debug, Clone, Default)]
pub struct PackageReport {
    pub name: String,
    /// Content hash unchanged; neither phase touched the package.
    pub skipped: bool,
    pub symbols: usize,
    pub collisions: usize,
    pub classes: usize,
    pub nodes: usize,
    pub edges: usize,
    pub decode_failures: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub packages: Vec<PackageReport>,
    pub index_duration: Duration,
    pub analyze_duration: Duration,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.packages.iter().any(|p| p.error.is_some())
    }

    pub fn failed_packages(&self) -> Vec<&PackageReport> {
        self.packages.iter().filter(|p| p.error.is_some()).collect()
    }

    pub fn total_symbols(&self) -> usize {
        self.packages.iter().map(|p| p.symbols).sum()
    }

    pub fn total_nodes(&self) -> usize {
        self.packages.iter().map(|p| p.nodes).sum()
    }

    pub fn total_edges(&self) -> usize {
        self.packages.iter().map(|p| p.edges).sum()
    }

    pub fn total_collisions(&self) -> usize {
        self.packages.iter().map(|p| p.collisions).sum()
    }
}

/// Execute one full run over the supplied packages.
pub fn run(db_path: &Path, specs: &[PackageSpec], options: &RunOptions) -> Result<RunReport> {
    if options.limit.is_some() && !options.init {
        return Err(EngineError::LimitRequiresInit.into());
    }

    let client = AnalyzerClient::new(&options.analyzer_url)?;
    probe_analyzer(&client)?;

    let mut store = Store::open(db_path, options.init)?;
    let cancel = cancellation_flag()?;

    let mut report = RunReport::default();
    for spec in specs {
        report.packages.push(PackageReport {
            name: spec.name.clone(),
            ..Default::default()
        });
    }

    // Phase 1: symbol index. Completes for every package before any edge
    // is written.
    let index_started = Instant::now();
    for (spec, package_report) in specs.iter().zip(report.packages.iter_mut()) {
        if cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled.into());
        }
        match index_package(&mut store, &client, spec) {
            Ok(outcome) => {
                package_report.skipped = outcome.skipped;
                package_report.symbols = outcome.symbols_written;
                package_report.collisions = outcome.collisions;
                package_report.decode_failures += outcome.decode_failures;
            }
            Err(err) if is_fatal(&err) => return Err(err),
            Err(err) => {
                warn!(package = %spec.name, error = %err, "package indexing failed");
                package_report.error = Some(err.to_string());
            }
        }
    }
    report.index_duration = index_started.elapsed();
    info!(
        packages = specs.len(),
        symbols = report.total_symbols(),
        collisions = report.total_collisions(),
        duration_ms = report.index_duration.as_millis() as u64,
        "symbol index phase complete"
    );

    // Phase 2: call graph, changed packages only. An unchanged corpus
    // performs zero writes here.
    let analyze_started = Instant::now();
    let mut resolver = PackageResolver::new();
    for (spec, package_report) in specs.iter().zip(report.packages.iter_mut()) {
        if package_report.error.is_some() || package_report.skipped {
            continue;
        }
        if cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled.into());
        }
        match analyze_package(
            &mut store,
            &client,
            spec,
            &options.domains,
            options.limit,
            &mut resolver,
            &cancel,
        ) {
            Ok(outcome) => {
                package_report.classes = outcome.classes;
                package_report.nodes = outcome.nodes_written;
                package_report.edges = outcome.edges_written;
                package_report.decode_failures += outcome.decode_failures;
            }
            Err(err) => {
                // The package's edges may be partially committed; drop its
                // metadata so the next run rebuilds it instead of skipping.
                if let Err(cleanup) = store.delete_metadata(&spec.name) {
                    warn!(package = %spec.name, error = %cleanup, "failed to mark package dirty");
                }
                if is_fatal(&err) {
                    return Err(err);
                }
                warn!(package = %spec.name, error = %err, "package analysis failed");
                package_report.error = Some(err.to_string());
            }
        }
    }
    report.analyze_duration = analyze_started.elapsed();
    info!(
        nodes = report.total_nodes(),
        edges = report.total_edges(),
        duration_ms = report.analyze_duration.as_millis() as u64,
        "call graph phase complete"
    );

    Ok(report)
}

/// Readiness probe with a single backed-off retry.
fn probe_analyzer(client: &AnalyzerClient) -> Result<()> {
    if let Err(first) = client.health() {
        warn!(error = %first, "analyzer health probe failed, retrying");
        std::thread::sleep(HEALTH_RETRY_BACKOFF);
        client.health()?;
    }
    Ok(())
}

/// Errors that abort the whole run rather than the current package.
fn is_fatal(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::HashMismatch { .. }) | Some(EngineError::Cancelled)
    )
}

fn cancellation_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))?;
    Ok(flag)
}
