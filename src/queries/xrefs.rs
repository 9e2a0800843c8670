//! Cross-reference handlers.

use super::QueryOutput;
use crate::descriptor::{
    raw_name_to_descriptor, FieldDescriptor, MethodDescriptor, TypeDescriptor,
};
use crate::engine::{Engine, EngineNode};
use crate::error::QueryError;
use crate::session::Session;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

/// A normalized reference target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefTarget {
    Class {
        id: String,
        name: String,
        declaring_type: String,
    },
    Method {
        id: String,
        name: String,
        declaring_type: String,
    },
    Field {
        id: String,
        name: String,
        declaring_type: String,
    },
}

impl RefTarget {
    pub fn id(&self) -> &str {
        match self {
            Self::Class { id, .. } | Self::Method { id, .. } | Self::Field { id, .. } => id,
        }
    }

    /// Convert an engine node. `Err` carries why the node was unusable.
    pub fn from_node(node: &EngineNode) -> Result<Self, String> {
        let owner = node
            .declaring_type
            .as_deref()
            .ok_or_else(|| format!("{} reference without declaring type", node.kind))?;
        let declaring_type = raw_name_to_descriptor(owner);

        match node.kind.as_str() {
            "class" => {
                let name = node.name.clone().unwrap_or_else(|| {
                    TypeDescriptor::from_raw(owner).simple_name().to_string()
                });
                Ok(Self::Class {
                    id: declaring_type.clone(),
                    name,
                    declaring_type,
                })
            }
            "method" => {
                let (Some(name), Some(ret)) = (&node.name, &node.return_type) else {
                    return Err(format!("incomplete method reference in {declaring_type}"));
                };
                let id = MethodDescriptor::new(
                    TypeDescriptor::from_raw(owner),
                    name.clone(),
                    node.arguments.clone(),
                    ret.clone(),
                )
                .to_string();
                Ok(Self::Method {
                    id,
                    name: name.clone(),
                    declaring_type,
                })
            }
            "field" => {
                let (Some(name), Some(ty)) = (&node.name, &node.field_type) else {
                    return Err(format!("incomplete field reference in {declaring_type}"));
                };
                let id = FieldDescriptor::new(TypeDescriptor::from_raw(owner), name.clone(), ty.clone())
                    .to_string();
                Ok(Self::Field {
                    id,
                    name: name.clone(),
                    declaring_type,
                })
            }
            other => Err(format!("unsupported reference kind `{other}`")),
        }
    }
}

/// Normalize every node, turning unusable ones into warnings.
fn collect_refs(session: &Session, nodes: &[EngineNode], warnings: &mut Vec<String>) -> Vec<RefTarget> {
    let mut refs = Vec::with_capacity(nodes.len());
    for node in nodes {
        match RefTarget::from_node(node) {
            Ok(target) => refs.push(target),
            Err(reason) => {
                warn!(session_id = %session.id, %reason, "Skipped reference");
                warnings.push(format!("skipped reference: {reason}"));
            }
        }
    }
    refs
}

fn xref_output(
    session: &Session,
    id: String,
    direction: &str,
    nodes: &[EngineNode],
) -> QueryOutput {
    let mut warnings = Vec::new();
    let refs = collect_refs(session, nodes, &mut warnings);
    QueryOutput::with_warnings(
        json!({
            "id": id,
            "kind": "xrefs",
            "direction": direction,
            "refs": refs,
            "provenance": session.provenance(),
        }),
        warnings,
    )
}

pub fn handle_xrefs_to(
    session: &Session,
    engine: &dyn Engine,
    method: &MethodDescriptor,
) -> Result<QueryOutput, QueryError> {
    let nodes = engine
        .method_used_by(method)?
        .ok_or_else(|| QueryError::MethodNotFound(method.to_string()))?;
    Ok(xref_output(session, method.to_string(), "to", &nodes))
}

pub fn handle_xrefs_from(
    session: &Session,
    engine: &dyn Engine,
    method: &MethodDescriptor,
) -> Result<QueryOutput, QueryError> {
    let nodes = engine
        .method_uses(method)?
        .ok_or_else(|| QueryError::MethodNotFound(method.to_string()))?;
    Ok(xref_output(session, method.to_string(), "from", &nodes))
}

pub fn handle_field_xrefs(
    session: &Session,
    engine: &dyn Engine,
    field: &FieldDescriptor,
) -> Result<QueryOutput, QueryError> {
    let nodes = engine
        .field_used_by(field)?
        .ok_or_else(|| QueryError::FieldNotFound(field.to_string()))?;
    Ok(xref_output(session, field.to_string(), "to", &nodes))
}

pub fn handle_class_xrefs(
    session: &Session,
    engine: &dyn Engine,
    ty: &TypeDescriptor,
) -> Result<QueryOutput, QueryError> {
    let nodes = engine
        .type_used_by(ty)?
        .ok_or_else(|| QueryError::TypeNotFound(ty.to_string()))?;
    Ok(xref_output(session, ty.to_string(), "to", &nodes))
}

pub fn handle_overrides(
    session: &Session,
    engine: &dyn Engine,
    method: &MethodDescriptor,
) -> Result<QueryOutput, QueryError> {
    let nodes = engine
        .overrides(method)?
        .ok_or_else(|| QueryError::MethodNotFound(method.to_string()))?;
    let mut warnings = Vec::new();
    let overrides: Vec<_> = collect_refs(session, &nodes, &mut warnings)
        .into_iter()
        .filter_map(|target| match target {
            RefTarget::Method {
                id,
                name,
                declaring_type,
            } => Some(json!({"id": id, "name": name, "declaring_type": declaring_type})),
            other => {
                warnings.push(format!("skipped non-method override {}", other.id()));
                None
            }
        })
        .collect();

    Ok(QueryOutput::with_warnings(
        json!({
            "id": method.to_string(),
            "overrides": overrides,
            "provenance": session.provenance(),
        }),
        warnings,
    ))
}

pub fn handle_unresolved(
    session: &Session,
    engine: &dyn Engine,
    method: &MethodDescriptor,
) -> Result<QueryOutput, QueryError> {
    let calls = engine
        .unresolved_calls(method)?
        .ok_or_else(|| QueryError::MethodNotFound(method.to_string()))?;
    let refs: Vec<_> = calls
        .into_iter()
        .map(|c| {
            json!({
                "parent_class": raw_name_to_descriptor(&c.parent_class),
                "name": c.name,
                "arg_types": c.arg_types,
                "return_type": c.return_type,
            })
        })
        .collect();

    Ok(QueryOutput::new(json!({
        "id": method.to_string(),
        "refs": refs,
        "provenance": session.provenance(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{parse_field, parse_method, parse_type};
    use crate::queries::tests::loaded;
    use crate::queries::Call;

    const CALL_ID: &str = "Lcom/test/Child;->call(I)Ljava/lang/String;";

    #[test]
    fn test_from_node() {
        let node = EngineNode {
            kind: "field".into(),
            declaring_type: Some("com/test/Child$Inner".into()),
            name: Some("count".into()),
            field_type: Some("I".into()),
            ..EngineNode::default()
        };
        assert_eq!(
            RefTarget::from_node(&node).unwrap(),
            RefTarget::Field {
                id: "Lcom/test/Child$Inner;->count:I".into(),
                name: "count".into(),
                declaring_type: "Lcom/test/Child$Inner;".into(),
            }
        );

        let incomplete = EngineNode {
            kind: "method".into(),
            declaring_type: Some("com/test/Child".into()),
            name: Some("call".into()),
            ..EngineNode::default()
        };
        assert!(RefTarget::from_node(&incomplete).is_err());

        let class = EngineNode {
            kind: "class".into(),
            declaring_type: Some("com/test/Helper".into()),
            ..EngineNode::default()
        };
        let target = RefTarget::from_node(&class).unwrap();
        assert_eq!(target.id(), "Lcom/test/Helper;");
        assert_eq!(serde_json::to_value(&target).unwrap()["name"], "Helper");
    }

    #[tokio::test]
    async fn test_xrefs_to_method() {
        let (_dir, registry, session) = loaded().await;
        let call = parse_method(CALL_ID).unwrap();
        let out = Call::XrefsTo(call).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["direction"], "to");
        assert_eq!(
            out.data["refs"],
            json!([{
                "kind": "method",
                "id": "Lcom/test/Child;->process()V",
                "name": "process",
                "declaring_type": "Lcom/test/Child;",
            }])
        );
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_xrefs_from_skips_unknown_kinds() {
        let (_dir, registry, session) = loaded().await;
        let process = parse_method("Lcom/test/Child;->process()V").unwrap();
        let out = Call::XrefsFrom(process).execute(session.clone()).await.unwrap();
        let refs = out.data["refs"].as_array().unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0]["id"], CALL_ID);
        assert_eq!(
            refs[1]["id"],
            "Lcom/test/Helper;->log(Ljava/lang/String;Ljava/lang/String;)V"
        );
        assert_eq!(refs[2]["kind"], "field");
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("lambda"));
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_field_and_class_xrefs() {
        let (_dir, registry, session) = loaded().await;
        let tag = parse_field("Lcom/test/Child;->TAG:Ljava/lang/String;").unwrap();
        let out = Call::FieldXrefs(tag).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["refs"][0]["id"], "Lcom/test/Child;->process()V");

        let base = parse_type("Lcom/test/Base;").unwrap();
        let out = Call::ClassXrefs(base).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["refs"][0]["kind"], "class");
        assert_eq!(out.data["refs"][0]["id"], "Lcom/test/Child;");

        let missing = parse_field("Lcom/test/Child;->TAG:I").unwrap();
        let err = Call::FieldXrefs(missing).execute(session.clone()).await.unwrap_err();
        assert!(matches!(err, QueryError::FieldNotFound(_)));
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_overrides_and_unresolved() {
        let (_dir, registry, session) = loaded().await;
        let call = parse_method(CALL_ID).unwrap();
        let out = Call::Overrides(call).execute(session.clone()).await.unwrap();
        assert_eq!(
            out.data["overrides"],
            json!([{
                "id": "Lcom/test/Callable;->call(I)Ljava/lang/String;",
                "name": "call",
                "declaring_type": "Lcom/test/Callable;",
            }])
        );

        let log = parse_method("Lcom/test/Helper;->log(Ljava/lang/String;Ljava/lang/String;)V")
            .unwrap();
        let out = Call::Unresolved(log).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["refs"][0]["parent_class"], "Ljava/io/PrintStream;");
        assert_eq!(out.data["refs"][0]["arg_types"], json!(["Ljava/lang/String;"]));
        registry.close_all().await;
    }
}
