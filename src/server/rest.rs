//! REST transport over HTTP/1.1.
//!
//! Fixed routes, one per schema entry, plus a generic `/v1/call`. The body of every
//! response is an envelope; the status code mirrors the envelope's error category.

use super::{close_session, list_sessions, load_artifact, CLOSE_SESSION};
use crate::dispatch::{resolve_method, Dispatcher, Envelope};
use crate::error::{ErrorKind, QueryError};
use crate::queries::QueryOutput;
use crate::schema;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Request bodies larger than this are rejected.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

type RestBody = BoxBody<Bytes, Infallible>;

/// HTTP status for an envelope.
pub fn status_for(envelope: &Envelope) -> StatusCode {
    if envelope.ok {
        return StatusCode::OK;
    }
    match envelope.error_kind {
        Some(ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorKind::InvalidInput) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::LoadFailed) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(ErrorKind::UpstreamFailure) => StatusCode::BAD_GATEWAY,
        Some(ErrorKind::Internal) | None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn no_route(method: &Method, path: &str) -> Envelope {
    Envelope {
        ok: false,
        query: path.to_string(),
        args: json!({}),
        data: None,
        error: Some(format!("NOT_FOUND: no route for {method} {path}")),
        warnings: Vec::new(),
        truncated: false,
        error_kind: Some(ErrorKind::NotFound),
    }
}

/// REST front end over one [`Dispatcher`].
#[derive(Clone)]
pub struct RestServer {
    dispatcher: Dispatcher,
}

impl RestServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Route one request. `body` is the raw request body; empty means `{}`.
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn handle(&self, method: &Method, path: &str, body: &[u8]) -> Envelope {
        let registry = self.dispatcher.registry();
        let segments: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let args = match parse_body(body) {
            Ok(args) => args,
            Err(e) => return Envelope::failure(path, json!({}), &e),
        };

        match (method, segments.as_slice()) {
            (&Method::GET, ["v1", "health"]) => {
                let sessions = registry.list().await;
                Envelope::success(
                    "health",
                    json!({}),
                    QueryOutput::new(json!({
                        "status": "ok",
                        "backend": registry.backend_name(),
                        "sessions": sessions.len(),
                        "cache_dir": registry.cache().root().display().to_string(),
                    })),
                )
            }
            (&Method::GET, ["v1", "methods"]) => Envelope::success(
                "methods",
                json!({}),
                QueryOutput::new(schema::catalog_json()),
            ),
            (&Method::GET, ["v1", "sessions"]) => list_sessions(registry, args).await,
            (&Method::POST, ["v1", "load"]) => load_artifact(registry, args).await,
            (&Method::POST, ["v1", "call"]) => {
                let Some(name) = args.get("method").and_then(Value::as_str) else {
                    return Envelope::failure(
                        "call",
                        args.clone(),
                        &QueryError::MissingArgument("method".into()),
                    );
                };
                if let Err(e) = resolve_method(name) {
                    return Envelope::failure(name, args.clone(), &e);
                }
                let Some(session_id) = args.get("session_id").and_then(Value::as_str) else {
                    return Envelope::failure(
                        name,
                        args.clone(),
                        &QueryError::MissingArgument("session_id".into()),
                    );
                };
                let call_args = args.get("args").cloned().unwrap_or_else(|| json!({}));
                self.dispatcher.dispatch(session_id, name, call_args).await
            }
            (&Method::POST, ["v1", "sessions", id, "close"]) => {
                close_session(registry, json!({"session_id": id})).await
            }
            (&Method::POST, ["v1", "sessions", id, rest @ ..]) => {
                let route = rest.join("/");
                match schema::get_by_route(&route) {
                    Some(m) => self.dispatcher.dispatch(id, m.name, args).await,
                    None => no_route(method, path),
                }
            }
            _ => no_route(method, path),
        }
    }

    /// Answer one HTTP request. Routing runs on its own task so a client that
    /// disconnects cannot abandon a session load or close halfway.
    async fn serve_request(self: Arc<Self>, req: Request<Incoming>) -> Response<RestBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let envelope = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => {
                let body = collected.to_bytes();
                let (task_method, task_path) = (method.clone(), path.clone());
                let server = self.clone();
                tokio::spawn(async move { server.handle(&task_method, &task_path, &body).await })
                    .await
                    .unwrap_or_else(|e| {
                        Envelope::failure(
                            &path,
                            json!({}),
                            &QueryError::Internal(format!("request task failed: {e}")),
                        )
                    })
            }
            Err(e) => Envelope::failure(
                &path,
                json!({}),
                &QueryError::InvalidParams(format!("request body: {e}")),
            ),
        };

        let status = status_for(&envelope);
        debug!(%method, %path, status = status.as_u16(), "Responded");
        let body = serde_json::to_vec(&envelope).unwrap_or_default();
        let mut response = Response::new(Full::new(Bytes::from(body)).boxed());
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// Accept connections until `cancel` fires.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> anyhow::Result<()> {
        let server = Arc::new(self);
        if let Ok(addr) = listener.local_addr() {
            info!("REST server listening on http://{addr}");
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("REST server shutting down");
                    break;
                }
                res = listener.accept() => {
                    let (stream, _) = res.map_err(|e| anyhow::anyhow!("accept failed: {e}"))?;
                    let server = server.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let server = server.clone();
                            async move { Ok::<_, Infallible>(server.serve_request(req).await) }
                        });
                        if let Err(err) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            error!("http connection error: {err}");
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

fn parse_body(body: &[u8]) -> Result<Value, QueryError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|e| QueryError::InvalidParams(format!("body is not valid JSON: {e}")))
}
