//! jarmap: deterministic call-graph extraction for JVM bytecode
//!
//! jarmap decodes compiled class images, extracts classes, methods,
//! inheritance, calls, and type-use relations, and persists them to a
//! SQLite fact base with content-hash-keyed incremental invalidation.
//! Analysis runs in a loopback HTTP worker; the orchestrator drives it
//! package by package and owns the single store writer.

pub mod callgraph;
pub mod classfile;
pub mod client;
pub mod error;
pub mod facts;
pub mod hashing;
pub mod indexer;
pub mod orchestrator;
pub mod package;
pub mod scan;
pub mod service;
pub mod store;

pub use callgraph::{analyze_package, AnalyzeOutcome, PackageResolver};
pub use classfile::{CallSite, ClassView, FieldView, InvokeKind, MethodView};
pub use client::AnalyzerClient;
pub use error::EngineError;
pub use facts::{emit, is_pervasive, method_fqn, ClassFacts, Edge, Node};
pub use hashing::hash_package_classes;
pub use indexer::{index_package, IndexOutcome};
pub use orchestrator::{run, PackageReport, RunOptions, RunReport};
pub use package::{load_manifest, PackageSpec};
pub use store::{EdgeRow, Store, StoreCounts, SymbolRow, UNKNOWN_PACKAGE};
