//! Rename overlay handlers.

use super::QueryOutput;
use crate::descriptor::Descriptor;
use crate::error::QueryError;
use crate::session::Session;
use serde_json::json;
use tracing::debug;

pub fn handle_rename(
    session: &Session,
    id: &Descriptor,
    alias: &str,
) -> Result<QueryOutput, QueryError> {
    let original_id = id.to_string();
    session.aliases.upsert(&original_id, id.kind(), alias)?;
    debug!(session_id = %session.id, id = %original_id, alias, "Alias set");
    Ok(QueryOutput::new(json!({
        "id": original_id,
        "alias": alias,
        "status": "ok",
    })))
}

pub fn handle_remove_rename(session: &Session, id: &Descriptor) -> Result<QueryOutput, QueryError> {
    let original_id = id.to_string();
    let removed = session.aliases.remove(&original_id)?;
    Ok(QueryOutput::new(json!({
        "id": original_id,
        "removed": removed,
        "status": if removed { "ok" } else { "not_found" },
    })))
}

pub fn handle_list_renames(session: &Session) -> Result<QueryOutput, QueryError> {
    Ok(QueryOutput::new(json!({
        "session_id": session.id,
        "renames": session.aliases.list_all()?,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_descriptor;
    use crate::queries::tests::loaded;
    use crate::queries::Call;

    #[tokio::test]
    async fn test_rename_lifecycle() {
        let (_dir, registry, session) = loaded().await;
        let field = parse_descriptor("Lcom/test/Child;->TAG:Ljava/lang/String;").unwrap();

        let out = Call::Rename {
            id: field.clone(),
            alias: "LOG_TAG".into(),
        }
        .execute(session.clone())
        .await
        .unwrap();
        assert_eq!(out.data["status"], "ok");

        Call::Rename {
            id: field.clone(),
            alias: "NAME".into(),
        }
        .execute(session.clone())
        .await
        .unwrap();

        let out = Call::ListRenames.execute(session.clone()).await.unwrap();
        assert_eq!(
            out.data["renames"],
            json!([{
                "original_id": "Lcom/test/Child;->TAG:Ljava/lang/String;",
                "entity_kind": "field",
                "alias": "NAME",
            }])
        );

        let out = Call::RemoveRename(field.clone()).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["removed"], true);
        let out = Call::RemoveRename(field).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["removed"], false);
        assert_eq!(out.data["status"], "not_found");
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_rename_leaves_source_untouched() {
        let (_dir, registry, session) = loaded().await;
        let child = parse_descriptor("Lcom/test/Child;").unwrap();
        Call::Rename {
            id: child,
            alias: "Kid".into(),
        }
        .execute(session.clone())
        .await
        .unwrap();

        let ty = crate::descriptor::parse_type("Lcom/test/Child;").unwrap();
        let out = Call::DecompileClass(ty).execute(session.clone()).await.unwrap();
        let java = out.data["java"].as_str().unwrap();
        assert!(java.contains("public class Child"));
        assert!(!java.contains("Kid"));
        registry.close_all().await;
    }
}
