//! Schema-driven dispatcher shared by every transport.
//!
//! A call names a method from [`crate::schema::METHOD_SCHEMAS`] and carries a JSON
//! argument bag. The bag is checked against the method's declared inputs before a
//! session is resolved, so malformed calls never queue engine work. Every outcome,
//! including unknown methods and sessions, comes back as an [`Envelope`].

use crate::error::{ErrorKind, QueryError};
use crate::queries::{Call, QueryOutput};
use crate::schema::{self, MethodSchema};
use crate::session::SessionRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Validated call arguments, with declared defaults filled in.
#[derive(Debug, Clone, Default)]
pub struct ArgBag {
    values: Map<String, Value>,
}

impl ArgBag {
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Check `args` against `schema`: it must be an object, every required input
    /// must be present and every declared input must have its declared JSON type.
    pub fn validate(schema: &MethodSchema, args: &Value) -> Result<Self, QueryError> {
        let Value::Object(given) = args else {
            return Err(QueryError::InvalidParams(
                "args must be a JSON object".to_string(),
            ));
        };

        let mut values = given.clone();
        for field in schema.inputs {
            match given.get(field.name) {
                Some(Value::Null) | None => {
                    if field.required {
                        return Err(QueryError::MissingArgument(field.name.to_string()));
                    }
                    values.remove(field.name);
                    if let Some(default) = field.default {
                        values.insert(field.name.to_string(), default.to_value());
                    }
                }
                Some(value) if !field.kind.accepts(value) => {
                    return Err(QueryError::InvalidParams(format!(
                        "`{}` must be of type {}",
                        field.name,
                        field.kind.as_str()
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(Self { values })
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn str(&self, name: &str) -> Result<&str, QueryError> {
        self.opt_str(name)
            .ok_or_else(|| QueryError::MissingArgument(name.to_string()))
    }

    pub fn bool(&self, name: &str) -> Result<bool, QueryError> {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| QueryError::MissingArgument(name.to_string()))
    }

    pub fn uint(&self, name: &str) -> Result<u64, QueryError> {
        match self.values.get(name) {
            None => Err(QueryError::MissingArgument(name.to_string())),
            Some(value) => value.as_u64().ok_or_else(|| {
                QueryError::InvalidParams(format!("`{name}` must be a non-negative integer"))
            }),
        }
    }
}

/// Uniform result shape for every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    pub query: String,
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub truncated: bool,
    /// Category of `error`, for transports that map it onto a status.
    #[serde(skip)]
    pub error_kind: Option<ErrorKind>,
}

impl Envelope {
    pub fn success(query: &str, args: Value, output: QueryOutput) -> Self {
        Self {
            ok: true,
            query: query.to_string(),
            args,
            data: Some(output.data),
            error: None,
            warnings: output.warnings,
            truncated: output.truncated,
            error_kind: None,
        }
    }

    pub fn failure(query: &str, args: Value, error: &QueryError) -> Self {
        Self {
            ok: false,
            query: query.to_string(),
            args,
            data: None,
            error: Some(error.render()),
            warnings: Vec::new(),
            truncated: false,
            error_kind: Some(error.kind()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Schema entry for `name`, or the unknown-method error listing every known name.
pub fn resolve_method(name: &str) -> Result<&'static MethodSchema, QueryError> {
    schema::get_method(name).ok_or_else(|| QueryError::UnknownMethod {
        name: name.to_string(),
        known: schema::method_names().collect::<Vec<_>>().join(", "),
    })
}

/// Routes method calls to sessions.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    #[instrument(skip_all, fields(session_id = %session_id, method = %method))]
    pub async fn dispatch(&self, session_id: &str, method: &str, args: Value) -> Envelope {
        match self.try_dispatch(session_id, method, &args).await {
            Ok(output) => {
                debug!(
                    warnings = output.warnings.len(),
                    truncated = output.truncated,
                    "Query ok"
                );
                Envelope::success(method, args, output)
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::UpstreamFailure | ErrorKind::Internal => {
                        warn!(error = %e, "Query failed")
                    }
                    _ => debug!(error = %e, "Query rejected"),
                }
                Envelope::failure(method, args, &e)
            }
        }
    }

    async fn try_dispatch(
        &self,
        session_id: &str,
        method: &str,
        args: &Value,
    ) -> Result<QueryOutput, QueryError> {
        let schema = resolve_method(method)?;
        let bag = ArgBag::validate(schema, args)?;
        let call = Call::parse(method, &bag)?;
        let session = self.registry.get(session_id).await?;
        call.execute(session).await
    }
}
