//! Wire types for the analysis service.
//!
//! Requests use camelCase keys, responses snake_case. The analyze response
//! is grouped per class so its record count is bounded by class count, not
//! edge count; the call-graph builder reconstructs flat edges from it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::facts::{self, ClassFacts};

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// `POST /index` — single file or list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_files: Option<Vec<PathBuf>>,
}

/// `POST /index/batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexBatchRequest {
    pub class_files: Vec<PathBuf>,
}

/// One symbol (the class itself or one of its methods) for `symbol_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSymbol {
    pub fqn: String,
    /// `class`, `interface`, or `method`.
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

/// Per-file record in the index path.
///
/// Three shapes share this struct: a decoded class (`success` with
/// symbols), a skipped enum (`success` + `skipped` + `reason`), and a
/// decode failure (`success:false` + `error`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexRecord {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_fqn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_entity: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<IndexedSymbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBatchResponse {
    pub success: bool,
    pub results: Vec<IndexRecord>,
}

/// `POST /index` response: the bare record for a single `classFile`, the
/// batch envelope for a `classFiles` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexResponse {
    Batch(IndexBatchResponse),
    Single(IndexRecord),
}

/// `POST /analyze`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_files: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_dirs: Option<Vec<PathBuf>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_roots: Option<Vec<PathBuf>>,
    /// FQN prefixes; classes matching none are omitted. Empty disables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedInheritance {
    /// `extends` or `implements`.
    pub kind: String,
    pub target: String,
}

/// A declared field whose type survived the pervasive filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedField {
    pub type_fqn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedCall {
    pub target_fqn: String,
    /// `new` or `standard`.
    pub kind: String,
    /// `-1` when the method has no line table.
    pub line: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedMethod {
    pub fqn: String,
    pub line: i64,
    pub visibility: String,
    pub has_override: bool,
    pub is_transactional: bool,
    /// Absent when the return type is pervasive (including `void`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    /// Non-pervasive parameter types, one entry per position.
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub calls: Vec<AnalyzedCall>,
}

/// Grouped analysis record for one class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedClass {
    pub fqn: String,
    /// `class`, `interface`, or `enum`.
    pub node_type: String,
    pub visibility: String,
    pub is_abstract: bool,
    #[serde(default)]
    pub inheritance: Vec<AnalyzedInheritance>,
    #[serde(default)]
    pub fields: Vec<AnalyzedField>,
    #[serde(default)]
    pub methods: Vec<AnalyzedMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeFailure {
    pub class_file: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub classes: Vec<AnalyzedClass>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<AnalyzeFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub status: String,
}

/// Typed error envelope for handler-level failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Regroup a flat fact stream into the grouped wire record.
///
/// The emitter's output order is relied on: the class node precedes method
/// nodes, and each method's `member_of`/`call` edges reference its FQN.
pub fn group_facts(
    node_type: &str,
    is_abstract: bool,
    facts: &ClassFacts,
) -> Option<AnalyzedClass> {
    let class_node = facts.nodes.iter().find(|n| n.node_type != "method")?;

    let mut grouped = AnalyzedClass {
        fqn: class_node.fqn.clone(),
        node_type: node_type.to_string(),
        visibility: class_node.visibility.clone(),
        is_abstract,
        inheritance: Vec::new(),
        fields: Vec::new(),
        methods: Vec::new(),
    };

    for edge in &facts.edges {
        if edge.edge_type == facts::EDGE_INHERITANCE {
            grouped.inheritance.push(AnalyzedInheritance {
                kind: edge.kind.clone(),
                target: edge.to_fqn.clone(),
            });
        } else if edge.edge_type == facts::EDGE_MEMBER_OF && edge.kind == facts::KIND_CLASS {
            grouped.fields.push(AnalyzedField {
                type_fqn: edge.from_fqn.clone(),
            });
        }
    }

    for node in facts.nodes.iter().filter(|n| n.node_type == "method") {
        let mut method = AnalyzedMethod {
            fqn: node.fqn.clone(),
            line: node.line.unwrap_or(-1),
            visibility: node.visibility.clone(),
            has_override: node.has_override,
            is_transactional: node.is_transactional,
            return_type: None,
            arguments: Vec::new(),
            calls: Vec::new(),
        };
        for edge in &facts.edges {
            if edge.edge_type == facts::EDGE_MEMBER_OF && edge.to_fqn == node.fqn {
                if edge.kind == facts::KIND_RETURN {
                    method.return_type = Some(edge.from_fqn.clone());
                } else if edge.kind == facts::KIND_ARGUMENT {
                    method.arguments.push(edge.from_fqn.clone());
                }
            } else if edge.edge_type == facts::EDGE_CALL && edge.from_fqn == node.fqn {
                method.calls.push(AnalyzedCall {
                    target_fqn: edge.to_fqn.clone(),
                    kind: edge.kind.clone(),
                    line: edge.from_line.unwrap_or(-1),
                });
            }
        }
        grouped.methods.push(method);
    }

    Some(grouped)
}
