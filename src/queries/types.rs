//! Type-level handlers.

use super::{alias_map, QueryOutput};
use crate::descriptor::{raw_name_to_descriptor, TypeDescriptor};
use crate::engine::Engine;
use crate::error::QueryError;
use crate::session::Session;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Serialize)]
struct TypeInfo {
    id: String,
    kind: crate::engine::TypeKind,
    name: String,
    full_name: String,
    package: String,
    access_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
}

pub fn handle_list_types(session: &Session, engine: &dyn Engine) -> Result<QueryOutput, QueryError> {
    let aliases = alias_map(session)?;
    let mut types: Vec<TypeInfo> = engine
        .types()?
        .into_iter()
        .map(|t| {
            let desc = TypeDescriptor::from_raw(t.raw_name);
            let id = desc.to_string();
            TypeInfo {
                alias: aliases.get(&id).cloned(),
                name: desc.simple_name().to_string(),
                full_name: desc.dotted(),
                package: desc.package(),
                id,
                kind: t.kind,
                access_flags: t.access_flags,
            }
        })
        .collect();
    types.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "types": types,
        "provenance": session.provenance(),
    })))
}

#[derive(Debug, Default, Serialize)]
struct PackageInfo {
    full_name: String,
    class_count: usize,
    sub_packages: BTreeSet<String>,
    class_ids: Vec<String>,
    is_leaf: bool,
}

/// Packages are derived from type names; every ancestor package is listed even
/// when it declares no classes itself.
pub fn handle_list_packages(
    session: &Session,
    engine: &dyn Engine,
) -> Result<QueryOutput, QueryError> {
    let mut packages: BTreeMap<String, PackageInfo> = BTreeMap::new();

    for t in engine.types()? {
        let desc = TypeDescriptor::from_raw(t.raw_name);
        let package = desc.package();
        if package.is_empty() {
            continue;
        }

        let mut parent: Option<String> = None;
        let mut path = String::new();
        for segment in package.split('.') {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(segment);
            if let Some(parent) = &parent {
                packages
                    .entry(parent.clone())
                    .or_default()
                    .sub_packages
                    .insert(path.clone());
            }
            packages.entry(path.clone()).or_default();
            parent = Some(path.clone());
        }

        let entry = packages.entry(package).or_default();
        entry.class_count += 1;
        entry.class_ids.push(desc.to_string());
    }

    let packages: Vec<PackageInfo> = packages
        .into_iter()
        .map(|(name, mut info)| {
            info.full_name = name;
            info.is_leaf = info.sub_packages.is_empty();
            info.class_ids.sort();
            info
        })
        .collect();

    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "total_packages": packages.len(),
        "packages": packages,
        "provenance": session.provenance(),
    })))
}

pub fn handle_hierarchy(
    session: &Session,
    engine: &dyn Engine,
    ty: &TypeDescriptor,
) -> Result<QueryOutput, QueryError> {
    let hierarchy = engine
        .hierarchy(ty)?
        .ok_or_else(|| QueryError::TypeNotFound(ty.to_string()))?;
    let access_flags = engine
        .types()?
        .into_iter()
        .find(|t| t.raw_name == ty.raw_name())
        .map(|t| t.access_flags)
        .unwrap_or_default();
    let descriptors = |names: &[String]| -> Vec<String> {
        names.iter().map(|n| raw_name_to_descriptor(n)).collect()
    };

    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "type_id": ty.to_string(),
        "super_class": hierarchy.super_class.as_deref().map(raw_name_to_descriptor),
        "interfaces": descriptors(&hierarchy.interfaces),
        "inner_classes": descriptors(&hierarchy.inner_classes),
        "access_flags": access_flags,
        "generic_parameters": hierarchy.generic_parameters,
        "generic_super_class": hierarchy.generic_super_class,
        "generic_interfaces": hierarchy.generic_interfaces,
        "provenance": session.provenance(),
    })))
}

pub fn handle_dependencies(
    session: &Session,
    engine: &dyn Engine,
    ty: &TypeDescriptor,
) -> Result<QueryOutput, QueryError> {
    let deps = engine
        .dependencies(ty)?
        .ok_or_else(|| QueryError::TypeNotFound(ty.to_string()))?;
    let dependencies: BTreeSet<String> = deps.iter().map(|d| raw_name_to_descriptor(d)).collect();

    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "type_id": ty.to_string(),
        "total_deps_count": dependencies.len(),
        "dependencies": dependencies,
        "provenance": session.provenance(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_type;
    use crate::queries::tests::loaded;
    use crate::queries::Call;

    #[tokio::test]
    async fn test_list_types_sorted_with_alias_overlay() {
        let (_dir, registry, session) = loaded().await;
        session
            .aliases
            .upsert("Lcom/test/Child;", "type", "Kid")
            .unwrap();

        let out = Call::ListTypes.execute(session.clone()).await.unwrap();
        let types = out.data["types"].as_array().unwrap();
        let ids: Vec<&str> = types.iter().map(|t| t["id"].as_str().unwrap()).collect();
        assert_eq!(
            ids,
            vec!["Lcom/test/Base;", "Lcom/test/Callable;", "Lcom/test/Child;", "Lcom/test/Helper;"]
        );
        assert_eq!(types[1]["kind"], "interface");
        assert_eq!(types[2]["alias"], "Kid");
        assert_eq!(types[2]["package"], "com.test");
        assert!(types[0].get("alias").is_none());
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_packages_include_ancestors() {
        let (_dir, registry, session) = loaded().await;
        let out = Call::ListPackages.execute(session.clone()).await.unwrap();
        assert_eq!(out.data["total_packages"], 2);
        let packages = out.data["packages"].as_array().unwrap();
        assert_eq!(packages[0]["full_name"], "com");
        assert_eq!(packages[0]["class_count"], 0);
        assert_eq!(packages[0]["sub_packages"], json!(["com.test"]));
        assert_eq!(packages[1]["full_name"], "com.test");
        assert_eq!(packages[1]["class_count"], 4);
        assert_eq!(packages[1]["is_leaf"], true);
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_hierarchy_uses_descriptors() {
        let (_dir, registry, session) = loaded().await;
        let child = parse_type("Lcom/test/Child;").unwrap();
        let out = Call::Hierarchy(child).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["super_class"], "Lcom/test/Base;");
        assert_eq!(out.data["interfaces"], json!(["Lcom/test/Callable;"]));
        assert_eq!(out.data["access_flags"], json!(["public"]));

        let missing = parse_type("Lcom/test/Missing;").unwrap();
        let err = Call::Hierarchy(missing).execute(session.clone()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_dependencies_sorted() {
        let (_dir, registry, session) = loaded().await;
        let child = parse_type("Lcom/test/Child;").unwrap();
        let out = Call::Dependencies(child).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["total_deps_count"], 4);
        assert_eq!(out.data["dependencies"][0], "Lcom/test/Base;");
        assert_eq!(out.data["dependencies"][3], "Ljava/lang/String;");
        registry.close_all().await;
    }
}
