//! Query operations, one per schema entry.
//!
//! Arguments are parsed into a [`Call`] before anything touches the engine, so
//! malformed descriptors fail without queueing work. Execution runs on the
//! session's engine thread.

pub mod aliases;
pub mod decompile;
pub mod members;
pub mod resources;
pub mod strings;
pub mod types;
pub mod xrefs;

use crate::cache::Bucket;
use crate::descriptor::{
    parse_descriptor, parse_field, parse_method, parse_type, Descriptor, FieldDescriptor,
    MethodDescriptor, TypeDescriptor,
};
use crate::dispatch::ArgBag;
use crate::engine::Engine;
use crate::error::QueryError;
use crate::session::Session;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub use strings::StringQuery;

/// Result of one query before it is wrapped in an envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub data: Value,
    pub warnings: Vec<String>,
    pub truncated: bool,
}

impl QueryOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            truncated: false,
        }
    }

    pub fn with_warnings(data: Value, warnings: Vec<String>) -> Self {
        Self {
            data,
            warnings,
            truncated: false,
        }
    }
}

/// A fully parsed query.
#[derive(Debug, Clone)]
pub enum Call {
    ListTypes,
    ListPackages,
    Hierarchy(TypeDescriptor),
    Dependencies(TypeDescriptor),
    ListMethods(TypeDescriptor),
    ListMethodsDetail(TypeDescriptor),
    ListFields(TypeDescriptor),
    Annotations(Descriptor),
    DecompileClass(TypeDescriptor),
    DecompileMethod(MethodDescriptor),
    XrefsTo(MethodDescriptor),
    XrefsFrom(MethodDescriptor),
    FieldXrefs(FieldDescriptor),
    ClassXrefs(TypeDescriptor),
    Overrides(MethodDescriptor),
    Unresolved(MethodDescriptor),
    SearchStrings(StringQuery),
    Manifest,
    ListResources,
    ResourceContent(String),
    Rename { id: Descriptor, alias: String },
    RemoveRename(Descriptor),
    ListRenames,
    ErrorReport,
    SessionInfo,
}

impl Call {
    /// Build the call for `method` from validated arguments.
    pub fn parse(method: &str, args: &ArgBag) -> Result<Self, QueryError> {
        let type_id = || parse_type(args.str("type_id")?);
        let method_id = || parse_method(args.str("method_id")?);

        Ok(match method {
            "list_types" => Self::ListTypes,
            "list_packages" => Self::ListPackages,
            "get_hierarchy" => Self::Hierarchy(type_id()?),
            "get_dependencies" => Self::Dependencies(type_id()?),
            "list_methods" => Self::ListMethods(type_id()?),
            "list_methods_detail" => Self::ListMethodsDetail(type_id()?),
            "list_fields" => Self::ListFields(type_id()?),
            "get_annotations" => Self::Annotations(annotation_target(args)?),
            "decompile_class" => Self::DecompileClass(type_id()?),
            "decompile_method" => Self::DecompileMethod(method_id()?),
            "xrefs_to" => Self::XrefsTo(method_id()?),
            "xrefs_from" => Self::XrefsFrom(method_id()?),
            "field_xrefs" => Self::FieldXrefs(parse_field(args.str("field_id")?)?),
            "class_xrefs" => Self::ClassXrefs(type_id()?),
            "overrides" => Self::Overrides(method_id()?),
            "unresolved_refs" => Self::Unresolved(method_id()?),
            "search_strings" => {
                let limit = args.uint("limit")?;
                if limit == 0 {
                    return Err(QueryError::InvalidParams("limit must be at least 1".into()));
                }
                Self::SearchStrings(StringQuery::new(
                    args.str("query")?,
                    args.bool("regex")?,
                    usize::try_from(limit).unwrap_or(usize::MAX),
                )?)
            }
            "get_manifest" => Self::Manifest,
            "list_resources" => Self::ListResources,
            "get_resource_content" => Self::ResourceContent(args.str("name")?.to_string()),
            "rename" => {
                let alias = args.str("alias")?.trim();
                if alias.is_empty() {
                    return Err(QueryError::InvalidParams("alias must not be empty".into()));
                }
                Self::Rename {
                    id: parse_descriptor(args.str("id")?)?,
                    alias: alias.to_string(),
                }
            }
            "remove_rename" => Self::RemoveRename(parse_descriptor(args.str("id")?)?),
            "list_renames" => Self::ListRenames,
            "error_report" => Self::ErrorReport,
            "session_info" => Self::SessionInfo,
            other => {
                return Err(QueryError::UnknownMethod {
                    name: other.to_string(),
                    known: crate::schema::method_names().collect::<Vec<_>>().join(", "),
                })
            }
        })
    }

    /// Run the call against `session`.
    pub async fn execute(self, session: Arc<Session>) -> Result<QueryOutput, QueryError> {
        let target = session.clone();
        session
            .run(move |engine| self.run_on(&target, &*engine))
            .await
    }

    fn run_on(self, session: &Session, engine: &dyn Engine) -> Result<QueryOutput, QueryError> {
        match self {
            Self::ListTypes => types::handle_list_types(session, engine),
            Self::ListPackages => types::handle_list_packages(session, engine),
            Self::Hierarchy(ty) => types::handle_hierarchy(session, engine, &ty),
            Self::Dependencies(ty) => types::handle_dependencies(session, engine, &ty),
            Self::ListMethods(ty) => members::handle_list_methods(session, engine, &ty),
            Self::ListMethodsDetail(ty) => members::handle_list_methods_detail(session, engine, &ty),
            Self::ListFields(ty) => members::handle_list_fields(session, engine, &ty),
            Self::Annotations(target) => members::handle_annotations(session, engine, &target),
            Self::DecompileClass(ty) => decompile::handle_decompile_class(session, engine, &ty),
            Self::DecompileMethod(m) => decompile::handle_decompile_method(session, engine, &m),
            Self::XrefsTo(m) => xrefs::handle_xrefs_to(session, engine, &m),
            Self::XrefsFrom(m) => xrefs::handle_xrefs_from(session, engine, &m),
            Self::FieldXrefs(f) => xrefs::handle_field_xrefs(session, engine, &f),
            Self::ClassXrefs(ty) => xrefs::handle_class_xrefs(session, engine, &ty),
            Self::Overrides(m) => xrefs::handle_overrides(session, engine, &m),
            Self::Unresolved(m) => xrefs::handle_unresolved(session, engine, &m),
            Self::SearchStrings(q) => strings::handle_search_strings(session, engine, &q),
            Self::Manifest => resources::handle_manifest(session, engine),
            Self::ListResources => resources::handle_list_resources(session, engine),
            Self::ResourceContent(name) => {
                resources::handle_resource_content(session, engine, &name)
            }
            Self::ErrorReport => resources::handle_error_report(session, engine),
            Self::Rename { id, alias } => aliases::handle_rename(session, &id, &alias),
            Self::RemoveRename(id) => aliases::handle_remove_rename(session, &id),
            Self::ListRenames => aliases::handle_list_renames(session),
            Self::SessionInfo => Ok(QueryOutput::new(serde_json::to_value(session.info())?)),
        }
    }
}

fn annotation_target(args: &ArgBag) -> Result<Descriptor, QueryError> {
    let given: Vec<&str> = ["type_id", "method_id", "field_id"]
        .into_iter()
        .filter(|name| args.opt_str(name).is_some())
        .collect();
    match given.as_slice() {
        ["type_id"] => Ok(Descriptor::Type(parse_type(args.str("type_id")?)?)),
        ["method_id"] => Ok(Descriptor::Method(parse_method(args.str("method_id")?)?)),
        ["field_id"] => Ok(Descriptor::Field(parse_field(args.str("field_id")?)?)),
        [] => Err(QueryError::MissingArgument(
            "one of type_id, method_id, field_id".to_string(),
        )),
        _ => Err(QueryError::InvalidParams(
            "pass exactly one of type_id, method_id, field_id".to_string(),
        )),
    }
}

// ============================================================================
// Shared helpers used across handlers
// ============================================================================

/// Fail with `TypeNotFound` unless the engine knows `ty`.
pub(crate) fn require_type(engine: &dyn Engine, ty: &TypeDescriptor) -> Result<(), QueryError> {
    match engine.hierarchy(ty)? {
        Some(_) => Ok(()),
        None => Err(QueryError::TypeNotFound(ty.to_string())),
    }
}

/// Unit text for `ty` through the disk cache. A failed cache write becomes a warning.
pub(crate) fn cached_unit_text(
    session: &Session,
    engine: &dyn Engine,
    bucket: Bucket,
    ty: &TypeDescriptor,
    warnings: &mut Vec<String>,
) -> Result<Option<String>, QueryError> {
    if let Some(text) = session.cache.get(&session.cache_key, bucket, ty.raw_name()) {
        return Ok(Some(text));
    }

    let text = match bucket {
        Bucket::Source => engine.unit_source(ty)?,
        Bucket::Disasm => engine.unit_disassembly(ty)?,
    };
    if let Some(text) = &text {
        if let Err(e) = session
            .cache
            .put(&session.cache_key, bucket, ty.raw_name(), text)
        {
            warn!(session_id = %session.id, error = %e, "Cache write failed");
            warnings.push(format!("cache write failed for {ty}: {e}"));
        }
    }
    Ok(text)
}

/// Descriptor → alias for every alias in the session.
pub(crate) fn alias_map(session: &Session) -> Result<HashMap<String, String>, QueryError> {
    Ok(session
        .aliases
        .list_all()?
        .into_iter()
        .map(|e| (e.original_id, e.alias))
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::DecompileSettings;
    use crate::session::{test_registry, SessionRegistry};
    use serde_json::json;
    use tempfile::TempDir;

    /// A registry with the sample artifact loaded into one session.
    pub(crate) async fn loaded() -> (TempDir, SessionRegistry, Arc<Session>) {
        let (dir, registry, path) = test_registry();
        let session = registry
            .load(&path, DecompileSettings::default())
            .await
            .unwrap();
        (dir, registry, session)
    }

    pub(crate) fn bag(args: Value) -> ArgBag {
        ArgBag::from_map(args.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_parse_rejects_bad_descriptor_before_engine() {
        let err = Call::parse("list_methods", &bag(json!({"type_id": "com.test.Child"})))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(err.to_string().contains("missing prefix"));
    }

    #[test]
    fn test_annotation_target_requires_exactly_one() {
        let err = Call::parse("get_annotations", &bag(json!({}))).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = Call::parse(
            "get_annotations",
            &bag(json!({"type_id": "Lcom/test/Child;", "field_id": "Lcom/test/Child;->TAG:I"})),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidParams(_)));
        assert!(matches!(
            Call::parse("get_annotations", &bag(json!({"method_id": "Lcom/test/Child;->process()V"}))),
            Ok(Call::Annotations(Descriptor::Method(_)))
        ));
    }

    #[test]
    fn test_rename_requires_alias_text() {
        let err = Call::parse(
            "rename",
            &bag(json!({"id": "Lcom/test/Child;", "alias": "  "})),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_session_info_query() {
        let (_dir, registry, session) = loaded().await;
        let out = Call::SessionInfo.execute(session.clone()).await.unwrap();
        assert_eq!(out.data["session_id"], json!(session.id));
        assert_eq!(out.data["status"], "active");
        assert_eq!(out.data["provenance"]["backend"], "jadx");
        registry.close_all().await;
    }
}
