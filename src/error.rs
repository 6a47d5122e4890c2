//! Engine-level error kinds.
//!
//! Per-file decode failures stay inside the analysis responses and never
//! surface here; these variants are the package- and run-level failures the
//! orchestrator routes on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The analysis service did not answer within its allowance, after the
    /// retry policy was exhausted. Aborts the current package.
    #[error("analyzer unavailable: {0}")]
    AnalyzerUnavailable(String),

    /// Post-write verification found the stored content hash disagreeing
    /// with the on-disk classes. Aborts the run.
    #[error("content hash mismatch for package {package}: recorded {recorded}, on disk {actual}")]
    HashMismatch {
        package: String,
        recorded: String,
        actual: String,
    },

    /// `limit` caps classes per package for test runs and only makes sense
    /// against a freshly initialized store.
    #[error("--limit requires --init")]
    LimitRequiresInit,

    /// The run was interrupted; completed packages remain committed.
    #[error("run cancelled")]
    Cancelled,
}
