//! Error types for the jadxd query service.
//!
//! Every failure a query can produce is a [`QueryError`]. Each variant maps onto one
//! of five protocol-facing codes (see [`ErrorKind`]); the dispatcher renders errors as
//! `"CODE: message"` inside a result envelope, so nothing here ever reaches a
//! transport as a fault.

use serde::Serialize;
use thiserror::Error;

/// Protocol-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    LoadFailed,
    UpstreamFailure,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidInput => "INVALID_INPUT",
            Self::LoadFailed => "LOAD_FAILED",
            Self::UpstreamFailure => "UPSTREAM_FAILURE",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Query execution errors.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Manifest unavailable for this input")]
    ManifestUnavailable,

    #[error("Invalid descriptor {input:?}: {reason}")]
    InvalidDescriptor { input: String, reason: &'static str },

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Unknown method {name:?}; known methods: {known}")]
    UnknownMethod { name: String, known: String },

    #[error("Failed to load {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Engine error: {0}")]
    Upstream(String),

    #[error("Session closed")]
    WorkerClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound(_)
            | Self::TypeNotFound(_)
            | Self::MethodNotFound(_)
            | Self::FieldNotFound(_)
            | Self::ResourceNotFound(_)
            | Self::ManifestUnavailable
            | Self::WorkerClosed => ErrorKind::NotFound,
            Self::InvalidDescriptor { .. }
            | Self::InvalidPattern(_)
            | Self::MissingArgument(_)
            | Self::InvalidParams(_)
            | Self::UnknownMethod { .. } => ErrorKind::InvalidInput,
            Self::LoadFailed { .. } => ErrorKind::LoadFailed,
            Self::Upstream(_) => ErrorKind::UpstreamFailure,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// `"CODE: message"`, the form carried in envelopes.
    pub fn render(&self) -> String {
        format!("{}: {}", self.code(), self)
    }

    pub(crate) fn load_failed(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::LoadFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl<T> From<std::sync::mpsc::SendError<T>> for QueryError {
    fn from(_: std::sync::mpsc::SendError<T>) -> Self {
        QueryError::WorkerClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for QueryError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        QueryError::WorkerClosed
    }
}

impl From<anyhow::Error> for QueryError {
    fn from(e: anyhow::Error) -> Self {
        QueryError::Upstream(format!("{e:#}"))
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        QueryError::Internal(format!("serialization failed: {e}"))
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(e: rusqlite::Error) -> Self {
        QueryError::Internal(format!("alias store: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uses_kind_code() {
        let err = QueryError::TypeNotFound("Lcom/test/Missing;".to_string());
        assert_eq!(err.render(), "NOT_FOUND: Type not found: Lcom/test/Missing;");
        assert_eq!(QueryError::Upstream("boom".to_string()).code(), "UPSTREAM_FAILURE");
        assert_eq!(QueryError::WorkerClosed.code(), "NOT_FOUND");
        assert_eq!(
            QueryError::MissingArgument("type_id".to_string()).kind(),
            ErrorKind::InvalidInput
        );
    }
}
