//! Analysis service.
//!
//! A long-lived loopback HTTP worker that decodes class files and returns
//! facts. The service holds no mutable state across requests; each request
//! decodes with per-request state only, parallelized over the supplied
//! file list with rayon.

pub mod protocol;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rayon::prelude::*;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::classfile::ClassView;
use crate::facts;
use crate::scan::collect_class_files;
use protocol::{
    group_facts, AnalyzeFailure, AnalyzeRequest, AnalyzeResponse, AnalyzedClass, HealthResponse,
    IndexBatchRequest, IndexBatchResponse, IndexRecord, IndexRequest, IndexResponse,
    IndexedSymbol, ShutdownResponse,
};

/// Loopback address the orchestrator connects to by default.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7421;

pub const SERVICE_NAME: &str = "jarmap-analyzer";

/// Delay between answering `/shutdown` and closing the listener.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

struct AppState {
    shutdown: Notify,
}

/// Run the analysis service until `/shutdown` or SIGINT.
pub fn run(host: &str, port: u16) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(serve(host, port))
}

async fn serve(host: &str, port: u16) -> Result<()> {
    let state = Arc::new(AppState {
        shutdown: Notify::new(),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/index", post(index))
        .route("/index/batch", post(index_batch))
        .route("/analyze", post(analyze))
        .route("/shutdown", post(shutdown))
        .with_state(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, "analysis service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = state.shutdown.notified() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        })
        .await
        .context("analysis service failed")?;

    info!("analysis service stopped");
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn index(Json(request): Json<IndexRequest>) -> Json<IndexResponse> {
    if let Some(files) = request.class_files {
        let results = run_blocking(move || index_files(&files)).await;
        return Json(IndexResponse::Batch(IndexBatchResponse {
            success: true,
            results,
        }));
    }

    let record = match request.class_file {
        Some(file) => run_blocking(move || index_one(&file)).await,
        None => IndexRecord {
            success: false,
            error: Some("classFile or classFiles is required".to_string()),
            ..Default::default()
        },
    };
    Json(IndexResponse::Single(record))
}

async fn index_batch(Json(request): Json<IndexBatchRequest>) -> Json<IndexBatchResponse> {
    let results = run_blocking(move || index_files(&request.class_files)).await;
    Json(IndexBatchResponse {
        success: true,
        results,
    })
}

async fn analyze(Json(request): Json<AnalyzeRequest>) -> Json<AnalyzeResponse> {
    Json(run_blocking(move || analyze_selection(&request)).await)
}

async fn shutdown(State(state): State<Arc<AppState>>) -> Json<ShutdownResponse> {
    info!("shutdown requested");
    tokio::spawn(async move {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        state.shutdown.notify_one();
    });
    Json(ShutdownResponse {
        status: "shutting down".to_string(),
    })
}

/// CPU-bound work runs off the async worker threads.
async fn run_blocking<T, F>(work: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .expect("analysis worker panicked")
}

/// Index a batch of class files, preserving input order.
pub fn index_files(class_files: &[PathBuf]) -> Vec<IndexRecord> {
    let results: Vec<IndexRecord> = class_files.par_iter().map(|path| index_one(path)).collect();
    let failed = results.iter().filter(|r| !r.success).count();
    debug!(
        files = class_files.len(),
        failed, "indexed class file batch"
    );
    results
}

/// Decode one class file into its index record.
///
/// Enums are indexed as themselves only (`skipped:"enum"`, no symbols);
/// their structure is still analyzed in the call-graph phase.
pub fn index_one(path: &Path) -> IndexRecord {
    let view = match decode(path) {
        Ok(view) => view,
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to decode class file");
            return IndexRecord {
                success: false,
                error: Some(format!("{}: {}", path.display(), error)),
                ..Default::default()
            };
        }
    };

    if view.is_enum() {
        return IndexRecord {
            success: true,
            class_fqn: Some(view.fqn),
            skipped: true,
            reason: Some("enum".to_string()),
            ..Default::default()
        };
    }

    let mut symbols = Vec::with_capacity(view.methods.len() + 1);
    symbols.push(IndexedSymbol {
        fqn: view.fqn.clone(),
        node_type: view.node_type().to_string(),
        line: None,
    });
    for method in &view.methods {
        symbols.push(IndexedSymbol {
            fqn: facts::method_fqn(&view.fqn, &method.name, &method.params),
            node_type: "method".to_string(),
            line: method.line.map(i64::from),
        });
    }

    IndexRecord {
        success: true,
        class_fqn: Some(view.fqn.clone()),
        node_type: Some(view.node_type().to_string()),
        is_entity: Some(is_entity(&view)),
        symbols,
        ..Default::default()
    }
}

/// Analyze the request's class selection into grouped per-class records.
pub fn analyze_selection(request: &AnalyzeRequest) -> AnalyzeResponse {
    let mut files: Vec<PathBuf> = Vec::new();
    if let Some(explicit) = &request.class_files {
        files.extend(explicit.iter().cloned());
    }
    if let Some(dirs) = &request.class_dirs {
        for dir in dirs {
            files.extend(collect_class_files(dir));
        }
    }
    if let Some(roots) = &request.package_roots {
        for root in roots {
            files.extend(collect_class_files(&root.join("classes")));
        }
    }
    if let Some(limit) = request.limit {
        files.truncate(limit);
    }

    let domains = request.domains.as_deref().unwrap_or(&[]);

    let decoded: Vec<std::result::Result<Option<AnalyzedClass>, AnalyzeFailure>> = files
        .par_iter()
        .map(|path| match decode(path) {
            Ok(view) => Ok(analyze_view(&view, domains)),
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to decode class file");
                Err(AnalyzeFailure {
                    class_file: path.display().to_string(),
                    error: error.to_string(),
                })
            }
        })
        .collect();

    let mut classes = Vec::new();
    let mut failures = Vec::new();
    for result in decoded {
        match result {
            Ok(Some(class)) => classes.push(class),
            Ok(None) => {}
            Err(failure) => failures.push(failure),
        }
    }

    debug!(
        files = files.len(),
        classes = classes.len(),
        failed = failures.len(),
        "analyzed class file batch"
    );

    AnalyzeResponse {
        success: true,
        classes,
        failures,
    }
}

fn analyze_view(view: &ClassView, domains: &[String]) -> Option<AnalyzedClass> {
    if !domains.is_empty() && !domains.iter().any(|prefix| view.fqn.starts_with(prefix)) {
        return None;
    }
    let class_facts = facts::emit(view);
    group_facts(view.node_type(), view.is_abstract(), &class_facts)
}

/// Entity heuristic carried over from the symbol index: a class is flagged
/// when its superclass name mentions `AuditableModel` or it lives in a
/// `.db.` package.
fn is_entity(view: &ClassView) -> bool {
    view.super_fqn
        .as_deref()
        .is_some_and(|s| s.contains("AuditableModel"))
        || view.fqn.contains(".db.")
}

fn decode(path: &Path) -> std::result::Result<ClassView, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read class file: {}", e))?;
    ClassView::parse(&bytes).map_err(|e| e.to_string())
}
