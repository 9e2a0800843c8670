//! Manifest, resource and diagnostics handlers.

use super::QueryOutput;
use crate::engine::Engine;
use crate::error::QueryError;
use crate::session::Session;
use serde_json::json;

pub fn handle_manifest(session: &Session, engine: &dyn Engine) -> Result<QueryOutput, QueryError> {
    let text = engine.manifest()?.ok_or(QueryError::ManifestUnavailable)?;
    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "kind": "manifest",
        "text": text,
        "provenance": session.provenance(),
    })))
}

pub fn handle_list_resources(
    session: &Session,
    engine: &dyn Engine,
) -> Result<QueryOutput, QueryError> {
    let mut resources = engine.resources()?;
    resources.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "resources": resources,
        "provenance": session.provenance(),
    })))
}

pub fn handle_resource_content(
    session: &Session,
    engine: &dyn Engine,
    name: &str,
) -> Result<QueryOutput, QueryError> {
    let content = engine
        .resource_content(name)?
        .ok_or_else(|| QueryError::ResourceNotFound(name.to_string()))?;
    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "name": content.name,
        "data_type": content.data_type,
        "text": content.text,
        "provenance": session.provenance(),
    })))
}

pub fn handle_error_report(
    session: &Session,
    engine: &dyn Engine,
) -> Result<QueryOutput, QueryError> {
    let diagnostics = engine.diagnostics()?;
    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "errors_count": diagnostics.errors_count,
        "warnings_count": diagnostics.warnings_count,
        "provenance": session.provenance(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DecompileSettings;
    use crate::engine::snapshot::fixtures;
    use crate::queries::tests::loaded;
    use crate::queries::Call;
    use crate::session::test_registry;

    #[tokio::test]
    async fn test_manifest_and_resources() {
        let (_dir, registry, session) = loaded().await;
        let out = Call::Manifest.execute(session.clone()).await.unwrap();
        assert_eq!(out.data["kind"], "manifest");
        assert!(out.data["text"].as_str().unwrap().contains("com.test"));

        let out = Call::ListResources.execute(session.clone()).await.unwrap();
        let names: Vec<&str> = out.data["resources"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["classes.dex", "res/values/strings.xml"]);
        assert_eq!(out.data["resources"][0]["size"], 4096);
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_resource_content() {
        let (_dir, registry, session) = loaded().await;
        let out = Call::ResourceContent("res/values/strings.xml".into())
            .execute(session.clone())
            .await
            .unwrap();
        assert_eq!(out.data["data_type"], "text");
        assert!(out.data["text"].as_str().unwrap().starts_with("<resources>"));

        let err = Call::ResourceContent("res/raw/missing.bin".into())
            .execute(session.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::ResourceNotFound(_)));
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_manifest_unavailable_for_bare_dex() {
        let (dir, registry, _) = test_registry();
        let mut artifact = fixtures::sample_artifact();
        artifact["input_type"] = json!("dex");
        artifact.as_object_mut().unwrap().remove("manifest");
        let path = fixtures::write_artifact(dir.path(), &artifact);
        let session = registry
            .load(&path.display().to_string(), DecompileSettings::default())
            .await
            .unwrap();

        let err = Call::Manifest.execute(session.clone()).await.unwrap_err();
        assert!(matches!(err, QueryError::ManifestUnavailable));
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_error_report() {
        let (_dir, registry, session) = loaded().await;
        let out = Call::ErrorReport.execute(session.clone()).await.unwrap();
        assert_eq!(out.data["errors_count"], 0);
        assert_eq!(out.data["warnings_count"], 2);
        assert_eq!(out.data["provenance"]["backend_version"], fixtures::ENGINE_VERSION);
        registry.close_all().await;
    }
}
