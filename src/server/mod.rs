//! Transports over the dispatcher.
//!
//! Both transports hand every schema method to [`Dispatcher`]. The only calls they
//! answer themselves are the session lifecycle ones defined here, and those also
//! come back as envelopes.

pub mod agent;
pub mod rest;

pub use agent::AgentServer;
pub use rest::RestServer;

use crate::cache::DecompileSettings;
use crate::dispatch::Envelope;
use crate::error::QueryError;
use crate::queries::QueryOutput;
use crate::session::{Provenance, SessionRegistry};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

pub const LOAD_ARTIFACT: &str = "load_artifact";
pub const CLOSE_SESSION: &str = "close_session";
pub const LIST_SESSIONS: &str = "list_sessions";

/// Returned by [`LOAD_ARTIFACT`].
#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub session_id: String,
    pub artifact_hash: String,
    pub input_type: String,
    pub class_count: usize,
    pub cache_key: String,
    pub provenance: Provenance,
}

fn envelope<T: Serialize>(query: &str, args: Value, result: Result<T, QueryError>) -> Envelope {
    match result.and_then(|data| Ok(serde_json::to_value(data)?)) {
        Ok(data) => Envelope::success(query, args, QueryOutput::new(data)),
        Err(e) => Envelope::failure(query, args, &e),
    }
}

fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, QueryError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| QueryError::MissingArgument(name.to_string()))
}

/// `{path, settings?}` → new session.
pub async fn load_artifact(registry: &SessionRegistry, args: Value) -> Envelope {
    let result = async {
        let path = required_str(&args, "path")?;
        let settings = match args.get("settings") {
            None | Some(Value::Null) => DecompileSettings::default(),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| QueryError::InvalidParams(format!("settings: {e}")))?,
        };
        let session = registry.load(path, settings).await?;
        Ok::<_, QueryError>(LoadResult {
            session_id: session.id.clone(),
            artifact_hash: session.artifact_hash.clone(),
            input_type: session.input_type.clone(),
            class_count: session.class_count,
            cache_key: session.cache_key.clone(),
            provenance: session.provenance(),
        })
    }
    .await;
    envelope(LOAD_ARTIFACT, args, result)
}

/// `{session_id}` → whether a session was closed. Closing twice is not an error.
pub async fn close_session(registry: &SessionRegistry, args: Value) -> Envelope {
    let result = async {
        let session_id = required_str(&args, "session_id")?;
        let closed = registry.close(session_id).await;
        info!(session_id = %session_id, closed, "Close requested");
        Ok::<_, QueryError>(json!({"session_id": session_id, "closed": closed}))
    }
    .await;
    envelope(CLOSE_SESSION, args, result)
}

pub async fn list_sessions(registry: &SessionRegistry, args: Value) -> Envelope {
    let sessions = registry.list().await;
    envelope(
        LIST_SESSIONS,
        args,
        Ok(json!({"count": sessions.len(), "sessions": sessions})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_registry;

    #[tokio::test]
    async fn test_load_list_close() {
        let (_dir, registry, path) = test_registry();
        let env = load_artifact(&registry, json!({"path": path})).await;
        assert!(env.ok, "{env:?}");
        let data = env.data.unwrap();
        assert_eq!(data["class_count"], 4);
        assert_eq!(data["input_type"], "apk");
        assert_eq!(data["provenance"]["settings"]["inline_methods"], true);
        let id = data["session_id"].as_str().unwrap().to_string();

        let env = list_sessions(&registry, json!({})).await;
        assert_eq!(env.data.unwrap()["count"], 1);

        let env = close_session(&registry, json!({"session_id": id})).await;
        assert_eq!(env.data.unwrap()["closed"], true);
        let env = close_session(&registry, json!({"session_id": id})).await;
        assert!(env.ok);
        assert_eq!(env.data.unwrap()["closed"], false);
    }

    #[tokio::test]
    async fn test_load_errors() {
        let (dir, registry, path) = test_registry();
        let env = load_artifact(&registry, json!({})).await;
        assert_eq!(
            env.error.as_deref(),
            Some("INVALID_INPUT: Missing required argument: path")
        );

        let env = load_artifact(&registry, json!({"path": path, "settings": {"deobfuscation": "yes"}}))
            .await;
        assert!(env.error.unwrap().starts_with("INVALID_INPUT: Invalid parameters: settings"));

        let missing = dir.path().join("absent.apk").display().to_string();
        let env = load_artifact(&registry, json!({"path": missing})).await;
        assert!(env.error.unwrap().starts_with("LOAD_FAILED"));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_partial_settings_keep_defaults() {
        let (_dir, registry, path) = test_registry();
        let env = load_artifact(&registry, json!({"path": path, "settings": {"deobfuscation": true}}))
            .await;
        let data = env.data.unwrap();
        let settings = &data["provenance"]["settings"];
        assert_eq!(settings["deobfuscation"], true);
        assert_eq!(settings["show_inconsistent_code"], true);
        registry.close_all().await;
    }
}
