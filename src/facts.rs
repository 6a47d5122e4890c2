//! Fact emission from decoded classes.
//!
//! Translates a [`ClassView`] into the node/edge stream persisted by the
//! store: one node per class and per method, `inheritance` edges for
//! extends/implements, `call` edges for invocation sites, and `member_of`
//! edges tying methods, field types, return types, and parameter types to
//! their owners. Pervasive base types (primitives, `void`, `java.lang.*`)
//! never appear as `member_of` sources.

use serde::{Deserialize, Serialize};

use crate::classfile::{visibility, ClassView};

pub const EDGE_CALL: &str = "call";
pub const EDGE_INHERITANCE: &str = "inheritance";
pub const EDGE_MEMBER_OF: &str = "member_of";

pub const KIND_EXTENDS: &str = "extends";
pub const KIND_IMPLEMENTS: &str = "implements";
pub const KIND_NEW: &str = "new";
pub const KIND_STANDARD: &str = "standard";
pub const KIND_METHOD: &str = "method";
pub const KIND_CLASS: &str = "class";
pub const KIND_RETURN: &str = "return";
pub const KIND_ARGUMENT: &str = "argument";

/// Annotations that mark a method transactional.
const TRANSACTIONAL_ANNOTATIONS: [&str; 3] = [
    "org.springframework.transaction.annotation.Transactional",
    "javax.transaction.Transactional",
    "jakarta.transaction.Transactional",
];

const OVERRIDE_ANNOTATION: &str = "java.lang.Override";

/// One row of the `nodes` table, minus the owning package (the call-graph
/// builder supplies it at persist time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub fqn: String,
    /// `class`, `interface`, `enum`, or `method`.
    pub node_type: String,
    /// Definition line for methods (`-1` when the image has no line table);
    /// absent for type nodes.
    pub line: Option<i64>,
    pub visibility: String,
    pub has_override: bool,
    pub is_transactional: bool,
}

/// One row of the `edges` table, minus package attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from_fqn: String,
    pub edge_type: String,
    pub to_fqn: String,
    pub kind: String,
    pub from_line: Option<i64>,
}

/// Fact stream for one class, in deterministic emission order.
#[derive(Debug, Clone, Default)]
pub struct ClassFacts {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Canonical method FQN: `<owner>.<simpleName>(<param1>, <param2>)`.
pub fn method_fqn(owner: &str, name: &str, params: &[String]) -> String {
    format!("{}.{}({})", owner, name, params.join(", "))
}

/// Whether a canonical type name is a pervasive base type, excluded from
/// `member_of` edges: the eight primitives, `void`, and everything under
/// `java.lang.`. Arrays are pervasive when their element type is.
pub fn is_pervasive(type_fqn: &str) -> bool {
    let mut element = type_fqn;
    while let Some(stripped) = element.strip_suffix("[]") {
        element = stripped;
    }
    matches!(
        element,
        "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double" | "void"
    ) || element.starts_with("java.lang.")
}

/// Emit the full fact stream for one decoded class.
pub fn emit(view: &ClassView) -> ClassFacts {
    let mut facts = ClassFacts::default();
    let class_fqn = view.fqn.clone();

    facts.nodes.push(Node {
        fqn: class_fqn.clone(),
        node_type: view.node_type().to_string(),
        line: None,
        visibility: visibility(view.access_flags).to_string(),
        has_override: false,
        is_transactional: false,
    });

    if let Some(super_fqn) = &view.super_fqn {
        if super_fqn != "java.lang.Object" {
            facts.edges.push(Edge {
                from_fqn: class_fqn.clone(),
                edge_type: EDGE_INHERITANCE.to_string(),
                to_fqn: super_fqn.clone(),
                kind: KIND_EXTENDS.to_string(),
                from_line: None,
            });
        }
    }
    for interface in &view.interfaces {
        facts.edges.push(Edge {
            from_fqn: class_fqn.clone(),
            edge_type: EDGE_INHERITANCE.to_string(),
            to_fqn: interface.clone(),
            kind: KIND_IMPLEMENTS.to_string(),
            from_line: None,
        });
    }

    for field in &view.fields {
        if !is_pervasive(&field.type_fqn) {
            facts.edges.push(Edge {
                from_fqn: field.type_fqn.clone(),
                edge_type: EDGE_MEMBER_OF.to_string(),
                to_fqn: class_fqn.clone(),
                kind: KIND_CLASS.to_string(),
                from_line: None,
            });
        }
    }

    for method in &view.methods {
        let fqn = method_fqn(&class_fqn, &method.name, &method.params);
        let line = method.line.map(i64::from).unwrap_or(-1);

        facts.nodes.push(Node {
            fqn: fqn.clone(),
            node_type: "method".to_string(),
            line: Some(line),
            visibility: visibility(method.access_flags).to_string(),
            has_override: method.annotations.iter().any(|a| a == OVERRIDE_ANNOTATION),
            is_transactional: method
                .annotations
                .iter()
                .any(|a| TRANSACTIONAL_ANNOTATIONS.contains(&a.as_str())),
        });

        facts.edges.push(Edge {
            from_fqn: fqn.clone(),
            edge_type: EDGE_MEMBER_OF.to_string(),
            to_fqn: class_fqn.clone(),
            kind: KIND_METHOD.to_string(),
            from_line: None,
        });

        if !is_pervasive(&method.return_type) {
            facts.edges.push(Edge {
                from_fqn: method.return_type.clone(),
                edge_type: EDGE_MEMBER_OF.to_string(),
                to_fqn: fqn.clone(),
                kind: KIND_RETURN.to_string(),
                from_line: None,
            });
        }

        // One edge per parameter position; repeated types repeat the edge.
        for param in &method.params {
            if !is_pervasive(param) {
                facts.edges.push(Edge {
                    from_fqn: param.clone(),
                    edge_type: EDGE_MEMBER_OF.to_string(),
                    to_fqn: fqn.clone(),
                    kind: KIND_ARGUMENT.to_string(),
                    from_line: None,
                });
            }
        }

        for call in &method.calls {
            let kind = if call.is_constructor_call() {
                KIND_NEW
            } else {
                KIND_STANDARD
            };
            facts.edges.push(Edge {
                from_fqn: fqn.clone(),
                edge_type: EDGE_CALL.to_string(),
                to_fqn: method_fqn(&call.owner, &call.name, &call.params),
                kind: kind.to_string(),
                from_line: Some(call.line.map(i64::from).unwrap_or(-1)),
            });
        }
    }

    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{CallSite, InvokeKind, MethodView, ACC_PUBLIC};

    fn empty_class(fqn: &str) -> ClassView {
        ClassView {
            fqn: fqn.to_string(),
            access_flags: ACC_PUBLIC,
            super_fqn: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    fn method(name: &str, params: &[&str], return_type: &str) -> MethodView {
        MethodView {
            name: name.to_string(),
            access_flags: ACC_PUBLIC,
            params: params.iter().map(|p| p.to_string()).collect(),
            return_type: return_type.to_string(),
            annotations: Vec::new(),
            line: Some(10),
            calls: Vec::new(),
        }
    }

    #[test]
    fn test_is_pervasive() {
        assert!(is_pervasive("int"));
        assert!(is_pervasive("void"));
        assert!(is_pervasive("java.lang.String"));
        assert!(is_pervasive("java.lang.reflect.Method"));
        assert!(is_pervasive("java.lang.String[]"));
        assert!(is_pervasive("int[][]"));
        assert!(!is_pervasive("java.util.List"));
        assert!(!is_pervasive("com.ex.Model"));
    }

    #[test]
    fn test_method_fqn_formatting() {
        assert_eq!(method_fqn("com.ex.A", "f", &[]), "com.ex.A.f()");
        assert_eq!(
            method_fqn(
                "com.ex.A",
                "g",
                &["java.lang.String".to_string(), "int".to_string()]
            ),
            "com.ex.A.g(java.lang.String, int)"
        );
    }

    #[test]
    fn test_empty_class_emits_single_node_and_no_edges() {
        let facts = emit(&empty_class("com.ex.Empty"));
        assert_eq!(facts.nodes.len(), 1);
        assert_eq!(facts.nodes[0].fqn, "com.ex.Empty");
        assert_eq!(facts.nodes[0].node_type, "class");
        assert_eq!(facts.nodes[0].visibility, "public");
        assert!(!facts.nodes[0].has_override);
        assert!(!facts.nodes[0].is_transactional);
        assert!(facts.edges.is_empty());
    }

    #[test]
    fn test_implicit_object_super_is_omitted() {
        let mut view = empty_class("com.ex.Child");
        view.super_fqn = Some("com.ex.Parent".to_string());
        view.interfaces = vec!["com.ex.I1".to_string(), "com.ex.I2".to_string()];
        let facts = emit(&view);

        let kinds: Vec<(&str, &str, &str)> = facts
            .edges
            .iter()
            .map(|e| (e.edge_type.as_str(), e.kind.as_str(), e.to_fqn.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("inheritance", "extends", "com.ex.Parent"),
                ("inheritance", "implements", "com.ex.I1"),
                ("inheritance", "implements", "com.ex.I2"),
            ]
        );
    }

    #[test]
    fn test_pervasive_params_and_returns_are_filtered() {
        let mut view = empty_class("com.ex.A");
        view.methods.push(method(
            "m",
            &["com.ex.P1", "java.lang.String", "int"],
            "com.ex.R",
        ));
        let facts = emit(&view);

        let member_of: Vec<(&str, &str)> = facts
            .edges
            .iter()
            .filter(|e| e.edge_type == EDGE_MEMBER_OF)
            .map(|e| (e.kind.as_str(), e.from_fqn.as_str()))
            .collect();
        assert_eq!(
            member_of,
            vec![
                ("method", "com.ex.A.m(com.ex.P1, java.lang.String, int)"),
                ("return", "com.ex.R"),
                ("argument", "com.ex.P1"),
            ]
        );
    }

    #[test]
    fn test_duplicate_argument_types_emit_duplicate_edges() {
        let mut view = empty_class("com.ex.A");
        view.methods
            .push(method("m", &["com.ex.P", "com.ex.P"], "void"));
        let facts = emit(&view);
        let argument_edges = facts
            .edges
            .iter()
            .filter(|e| e.kind == KIND_ARGUMENT && e.from_fqn == "com.ex.P")
            .count();
        assert_eq!(argument_edges, 2);
    }

    #[test]
    fn test_constructor_call_is_new_kind() {
        let mut view = empty_class("com.ex.A");
        let mut m = method("f", &[], "void");
        m.calls.push(CallSite {
            owner: "com.ex.B".to_string(),
            name: "<init>".to_string(),
            params: Vec::new(),
            kind: InvokeKind::Special,
            line: Some(12),
        });
        m.calls.push(CallSite {
            owner: "com.ex.B".to_string(),
            name: "g".to_string(),
            params: Vec::new(),
            kind: InvokeKind::Virtual,
            line: Some(12),
        });
        view.methods.push(m);

        let facts = emit(&view);
        let calls: Vec<(&str, &str)> = facts
            .edges
            .iter()
            .filter(|e| e.edge_type == EDGE_CALL)
            .map(|e| (e.kind.as_str(), e.to_fqn.as_str()))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("new", "com.ex.B.<init>()"),
                ("standard", "com.ex.B.g()"),
            ]
        );
    }

    #[test]
    fn test_annotations_set_method_flags() {
        let mut view = empty_class("com.ex.A");
        let mut m = method("h", &[], "void");
        m.access_flags = crate::classfile::ACC_PROTECTED;
        m.annotations = vec![
            "java.lang.Override".to_string(),
            "org.springframework.transaction.annotation.Transactional".to_string(),
        ];
        view.methods.push(m);

        let facts = emit(&view);
        let node = facts.nodes.iter().find(|n| n.node_type == "method").unwrap();
        assert_eq!(node.visibility, "protected");
        assert!(node.has_override);
        assert!(node.is_transactional);
    }

    #[test]
    fn test_missing_line_table_yields_minus_one() {
        let mut view = empty_class("com.ex.A");
        let mut m = method("f", &[], "void");
        m.line = None;
        m.calls.push(CallSite {
            owner: "com.ex.B".to_string(),
            name: "g".to_string(),
            params: Vec::new(),
            kind: InvokeKind::Static,
            line: None,
        });
        view.methods.push(m);

        let facts = emit(&view);
        let node = facts.nodes.iter().find(|n| n.node_type == "method").unwrap();
        assert_eq!(node.line, Some(-1));
        let call = facts.edges.iter().find(|e| e.edge_type == EDGE_CALL).unwrap();
        assert_eq!(call.from_line, Some(-1));
    }
}
