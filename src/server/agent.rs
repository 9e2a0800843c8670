//! MCP transport for schema-driven agents.
//!
//! The tool list is the three session lifecycle tools plus one tool per schema
//! entry. Schema tools carry no per-method code: `session_id` is split off the
//! arguments and the rest goes to the dispatcher as-is.

use super::{close_session, list_sessions, load_artifact, CLOSE_SESSION, LIST_SESSIONS, LOAD_ARTIFACT};
use crate::dispatch::{resolve_method, Dispatcher, Envelope};
use crate::error::QueryError;
use crate::schema::{self, METHOD_SCHEMAS};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, ListToolsResult, PaginatedRequestParams,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData as McpError, ServerHandler};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, instrument};

/// MCP server over one [`Dispatcher`].
#[derive(Clone)]
pub struct AgentServer {
    dispatcher: Dispatcher,
}

impl AgentServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    fn instructions(&self) -> String {
        let categories: Vec<String> = schema::MethodCategory::all()
            .iter()
            .map(|c| format!("- {}: {}", c.as_str(), c.description()))
            .collect();
        format!(
            "Query service over a Java/Dalvik decompiler.\n\n\
             Workflow:\n\
             1. load_artifact: load an APK/DEX analysis export; returns a session_id\n\
             2. Call any query tool with that session_id\n\
             3. close_session when done\n\n\
             Identifiers are descriptors: Lcom/example/Foo; for types, \
             Lcom/example/Foo;->bar(I)V for methods, Lcom/example/Foo;->count:I for fields.\n\
             Every result is an envelope {{ok, query, args, data, error, warnings, truncated}}.\n\n\
             Categories:\n{}",
            categories.join("\n")
        )
    }

    fn make_tool(name: &'static str, description: &'static str, schema: Map<String, Value>) -> Tool {
        Tool {
            name: Cow::Borrowed(name),
            description: Some(Cow::Borrowed(description)),
            input_schema: Arc::new(schema),
            annotations: None,
            execution: None,
            icons: None,
            meta: None,
            output_schema: None,
            title: None,
        }
    }

    fn object_schema(schema: Value) -> Map<String, Value> {
        match schema {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn lifecycle_tools() -> Vec<Tool> {
        vec![
            Self::make_tool(
                LOAD_ARTIFACT,
                "Load an artifact into a new session. Returns session_id, artifact hash, \
                 class count, cache key and provenance.",
                Self::object_schema(json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the artifact (~/ is expanded)"
                        },
                        "settings": {
                            "type": "object",
                            "description": "Decompile settings; omitted fields keep their defaults",
                            "properties": {
                                "deobfuscation": {"type": "boolean", "default": false},
                                "inline_methods": {"type": "boolean", "default": true},
                                "show_inconsistent_code": {"type": "boolean", "default": true}
                            }
                        }
                    },
                    "required": ["path"]
                })),
            ),
            Self::make_tool(
                CLOSE_SESSION,
                "Close a session and release its engine and aliases. Closing twice is harmless.",
                Self::object_schema(json!({
                    "type": "object",
                    "properties": {
                        "session_id": {"type": "string", "description": "Session to close"}
                    },
                    "required": ["session_id"]
                })),
            ),
            Self::make_tool(
                LIST_SESSIONS,
                "List live sessions with artifact hash, cache key, status and timestamps.",
                Self::object_schema(json!({"type": "object", "properties": {}})),
            ),
        ]
    }

    /// Every tool this server exposes.
    pub fn tools() -> Vec<Tool> {
        let mut tools = Self::lifecycle_tools();
        tools.extend(
            METHOD_SCHEMAS
                .iter()
                .map(|m| Self::make_tool(m.name, m.description, m.json_schema())),
        );
        tools
    }

    /// Route one call and return its envelope.
    #[instrument(skip_all, fields(tool = %name))]
    pub async fn handle_call(&self, name: &str, arguments: Option<Map<String, Value>>) -> Envelope {
        let mut args = arguments.unwrap_or_default();
        let registry = self.dispatcher.registry();

        match name {
            LOAD_ARTIFACT => load_artifact(registry, Value::Object(args)).await,
            CLOSE_SESSION => close_session(registry, Value::Object(args)).await,
            LIST_SESSIONS => list_sessions(registry, Value::Object(args)).await,
            _ => {
                if let Err(e) = resolve_method(name) {
                    return Envelope::failure(name, Value::Object(args), &e);
                }
                let session_id = match args.remove("session_id") {
                    Some(Value::String(id)) => id,
                    other => {
                        if let Some(value) = other {
                            args.insert("session_id".into(), value);
                        }
                        let err = QueryError::MissingArgument("session_id".into());
                        return Envelope::failure(name, Value::Object(args), &err);
                    }
                };
                debug!(session_id = %session_id, "Forwarding to dispatcher");
                self.dispatcher
                    .dispatch(&session_id, name, Value::Object(args))
                    .await
            }
        }
    }

    fn to_result(envelope: &Envelope) -> CallToolResult {
        let text = serde_json::to_string(envelope).unwrap_or_else(|e| {
            json!({"ok": false, "query": envelope.query, "error": format!("INTERNAL: {e}")})
                .to_string()
        });
        if envelope.ok {
            CallToolResult::success(vec![Content::text(text)])
        } else {
            CallToolResult::error(vec![Content::text(text)])
        }
    }
}

impl ServerHandler for AgentServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(self.instructions()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let envelope = self.handle_call(&params.name, params.arguments).await;
        Ok(Self::to_result(&envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_registry;

    fn server() -> (tempfile::TempDir, AgentServer, String) {
        let (dir, registry, path) = test_registry();
        let server = AgentServer::new(Dispatcher::new(Arc::new(registry)));
        (dir, server, path)
    }

    fn args(value: Value) -> Option<Map<String, Value>> {
        value.as_object().cloned()
    }

    #[test]
    fn test_tool_list_mirrors_schema_table() {
        let tools = AgentServer::tools();
        assert_eq!(tools.len(), METHOD_SCHEMAS.len() + 3);
        assert_eq!(tools[0].name, LOAD_ARTIFACT);

        let xrefs = tools.iter().find(|t| t.name == "xrefs_to").unwrap();
        assert_eq!(
            xrefs.input_schema.get("required"),
            Some(&json!(["session_id", "method_id"]))
        );
    }

    #[tokio::test]
    async fn test_agent_session_flow() {
        let (_dir, server, path) = server();
        let loaded = server.handle_call(LOAD_ARTIFACT, args(json!({"path": path}))).await;
        assert!(loaded.ok, "{loaded:?}");
        let session_id = loaded.data.unwrap()["session_id"].as_str().unwrap().to_string();

        let env = server
            .handle_call(
                "list_fields",
                args(json!({"session_id": session_id, "type_id": "Lcom/test/Child;"})),
            )
            .await;
        assert!(env.ok);
        assert_eq!(env.args, json!({"type_id": "Lcom/test/Child;"}));
        assert_eq!(env.data.unwrap()["fields"][0]["name"], "TAG");

        let result = AgentServer::to_result(&env_failure(&server, &session_id).await);
        assert_eq!(result.is_error, Some(true));

        let closed = server
            .handle_call(CLOSE_SESSION, args(json!({"session_id": session_id})))
            .await;
        assert_eq!(closed.data.unwrap()["closed"], true);
        let env = server
            .handle_call("list_types", args(json!({"session_id": session_id})))
            .await;
        assert!(env.error.unwrap().starts_with("NOT_FOUND"));
    }

    async fn env_failure(server: &AgentServer, session_id: &str) -> Envelope {
        server
            .handle_call(
                "decompile_method",
                args(json!({"session_id": session_id, "method_id": "Lcom/test/Child;->nope()V"})),
            )
            .await
    }

    #[tokio::test]
    async fn test_missing_session_id() {
        let (_dir, server, _) = server();
        let env = server.handle_call("list_types", None).await;
        assert_eq!(
            env.error.as_deref(),
            Some("INVALID_INPUT: Missing required argument: session_id")
        );
        let env = server
            .handle_call("list_types", args(json!({"session_id": 7})))
            .await;
        assert!(!env.ok);
        assert_eq!(env.args, json!({"session_id": 7}));
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_before_session_id() {
        let (_dir, server, _) = server();
        let env = server.handle_call("frobnicate", None).await;
        let error = env.error.unwrap();
        assert!(error.starts_with("INVALID_INPUT: Unknown method"), "{error}");
        assert!(error.contains("list_types"));
    }
}
