//! Method, field and annotation handlers.

use super::{alias_map, QueryOutput};
use crate::descriptor::{Descriptor, FieldDescriptor, TypeDescriptor};
use crate::engine::{Engine, MethodModel};
use crate::error::QueryError;
use crate::session::Session;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
struct MethodSummary {
    id: String,
    name: String,
    access_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
}

#[derive(Debug, Serialize)]
struct MethodDetail {
    id: String,
    name: String,
    access_flags: Vec<String>,
    arguments: Vec<String>,
    return_type: String,
    is_constructor: bool,
    is_class_init: bool,
    throws: Vec<String>,
    generic_arguments: Vec<String>,
    generic_return_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct FieldInfo {
    id: String,
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    access_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
}

fn methods_of(engine: &dyn Engine, ty: &TypeDescriptor) -> Result<Vec<MethodModel>, QueryError> {
    engine
        .methods(ty)?
        .ok_or_else(|| QueryError::TypeNotFound(ty.to_string()))
}

pub fn handle_list_methods(
    session: &Session,
    engine: &dyn Engine,
    ty: &TypeDescriptor,
) -> Result<QueryOutput, QueryError> {
    let aliases = alias_map(session)?;
    let methods: Vec<MethodSummary> = methods_of(engine, ty)?
        .into_iter()
        .map(|m| {
            let id = m.descriptor(ty).to_string();
            MethodSummary {
                alias: aliases.get(&id).cloned(),
                id,
                name: m.name,
                access_flags: m.access_flags,
            }
        })
        .collect();

    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "type_id": ty.to_string(),
        "methods": methods,
        "provenance": session.provenance(),
    })))
}

pub fn handle_list_methods_detail(
    session: &Session,
    engine: &dyn Engine,
    ty: &TypeDescriptor,
) -> Result<QueryOutput, QueryError> {
    let methods: Vec<MethodDetail> = methods_of(engine, ty)?
        .into_iter()
        .map(|m| {
            let desc = m.descriptor(ty);
            MethodDetail {
                id: desc.to_string(),
                is_constructor: desc.is_constructor(),
                is_class_init: desc.is_class_init(),
                name: m.name,
                access_flags: m.access_flags,
                arguments: m.arguments,
                return_type: m.return_type,
                throws: m.throws,
                generic_arguments: m.generic_arguments,
                generic_return_type: m.generic_return_type,
            }
        })
        .collect();

    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "type_id": ty.to_string(),
        "methods": methods,
        "provenance": session.provenance(),
    })))
}

pub fn handle_list_fields(
    session: &Session,
    engine: &dyn Engine,
    ty: &TypeDescriptor,
) -> Result<QueryOutput, QueryError> {
    let aliases = alias_map(session)?;
    let fields: Vec<FieldInfo> = engine
        .fields(ty)?
        .ok_or_else(|| QueryError::TypeNotFound(ty.to_string()))?
        .into_iter()
        .map(|f| {
            let id = FieldDescriptor::new(ty.clone(), f.name.clone(), f.field_type.clone())
                .to_string();
            FieldInfo {
                alias: aliases.get(&id).cloned(),
                id,
                name: f.name,
                field_type: f.field_type,
                access_flags: f.access_flags,
            }
        })
        .collect();

    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "type_id": ty.to_string(),
        "fields": fields,
        "provenance": session.provenance(),
    })))
}

pub fn handle_annotations(
    session: &Session,
    engine: &dyn Engine,
    target: &Descriptor,
) -> Result<QueryOutput, QueryError> {
    let (annotations, parameter_annotations) = match target {
        Descriptor::Type(ty) => (
            engine
                .type_annotations(ty)?
                .ok_or_else(|| QueryError::TypeNotFound(ty.to_string()))?,
            None,
        ),
        Descriptor::Method(m) => {
            let found = engine
                .method_annotations(m)?
                .ok_or_else(|| QueryError::MethodNotFound(m.to_string()))?;
            (found.annotations, found.parameter_annotations)
        }
        Descriptor::Field(f) => (
            engine
                .field_annotations(f)?
                .ok_or_else(|| QueryError::FieldNotFound(f.to_string()))?,
            None,
        ),
    };

    let mut data = json!({
        "id": target.to_string(),
        "kind": target.kind(),
        "annotations": annotations,
        "provenance": session.provenance(),
    });
    if let Some(params) = parameter_annotations {
        data["parameter_annotations"] = json!(params);
    }
    Ok(QueryOutput::new(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{parse_descriptor, parse_type};
    use crate::queries::tests::loaded;
    use crate::queries::Call;

    const CALL_ID: &str = "Lcom/test/Child;->call(I)Ljava/lang/String;";

    #[tokio::test]
    async fn test_list_methods_with_alias() {
        let (_dir, registry, session) = loaded().await;
        session.aliases.upsert(CALL_ID, "method", "render").unwrap();
        let child = parse_type("Lcom/test/Child;").unwrap();

        let out = Call::ListMethods(child).execute(session.clone()).await.unwrap();
        let methods = out.data["methods"].as_array().unwrap();
        assert_eq!(methods.len(), 3);
        assert_eq!(methods[0]["id"], "Lcom/test/Child;-><init>()V");
        assert_eq!(methods[1]["id"], CALL_ID);
        assert_eq!(methods[1]["alias"], "render");
        assert!(methods[2].get("alias").is_none());
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_method_detail_flags() {
        let (_dir, registry, session) = loaded().await;
        let helper = parse_type("Lcom/test/Helper;").unwrap();
        let out = Call::ListMethodsDetail(helper).execute(session.clone()).await.unwrap();
        let compute = &out.data["methods"][1];
        assert_eq!(compute["id"], "Lcom/test/Helper;->compute(II)I");
        assert_eq!(compute["throws"], json!(["Ljava/lang/ArithmeticException;"]));
        assert_eq!(compute["is_constructor"], false);

        let child = parse_type("Lcom/test/Child;").unwrap();
        let out = Call::ListMethodsDetail(child).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["methods"][0]["is_constructor"], true);
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_list_fields() {
        let (_dir, registry, session) = loaded().await;
        let child = parse_type("Lcom/test/Child;").unwrap();
        let out = Call::ListFields(child).execute(session.clone()).await.unwrap();
        assert_eq!(
            out.data["fields"],
            json!([{
                "id": "Lcom/test/Child;->TAG:Ljava/lang/String;",
                "name": "TAG",
                "type": "Ljava/lang/String;",
                "access_flags": ["private", "static", "final"],
            }])
        );

        let missing = parse_type("Lcom/test/Gone;").unwrap();
        let err = Call::ListFields(missing).execute(session.clone()).await.unwrap_err();
        assert!(matches!(err, QueryError::TypeNotFound(_)));
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_annotations_by_kind() {
        let (_dir, registry, session) = loaded().await;
        let base = parse_descriptor("Lcom/test/Base;").unwrap();
        let out = Call::Annotations(base).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["kind"], "type");
        assert_eq!(out.data["annotations"][0]["annotation_class"], "Ljava/lang/Deprecated;");

        let call = parse_descriptor(CALL_ID).unwrap();
        let out = Call::Annotations(call).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["kind"], "method");
        assert_eq!(out.data["parameter_annotations"], json!([[]]));

        let missing = parse_descriptor("Lcom/test/Child;->nope()V").unwrap();
        let err = Call::Annotations(missing).execute(session.clone()).await.unwrap_err();
        assert!(matches!(err, QueryError::MethodNotFound(_)));
        registry.close_all().await;
    }
}
