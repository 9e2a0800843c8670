//! Query service over a Java/Dalvik decompilation engine.
//!
//! This library puts a stable, cacheable query surface in front of an engine that
//! turns APK/DEX artifacts into Java-like source. Agents and HTTP clients load an
//! artifact into a session, then ask schema-declared questions about it using
//! descriptor identifiers.
//!
//! # Architecture
//!
//! - **Engine workers**: every session owns one OS thread running its
//!   [`engine::Engine`]. The engine is not reentrant, so all jobs for a session
//!   go through that thread's bounded queue (`engine::EngineWorker`).
//!
//! - **Registry**: [`session::SessionRegistry`] loads artifacts, hashes them for
//!   the cache key and owns the live sessions and their alias stores.
//!
//! - **Cache**: [`cache::DiskCache`] stores decompiled unit text under
//!   `sha256(artifact) + engine version + settings`, so repeated reads are
//!   byte-identical across sessions and restarts.
//!
//! - **Dispatcher**: [`dispatch::Dispatcher`] validates a call against
//!   [`schema::METHOD_SCHEMAS`] and runs it. Every outcome is a
//!   [`dispatch::Envelope`].
//!
//! - **Transports**: [`server::AgentServer`] speaks MCP over stdio and
//!   [`server::RestServer`] serves HTTP/1.1. Neither contains per-method code.
//!
//! # Methods
//!
//! ## Types
//! - `list_types`, `list_packages`, `get_hierarchy`, `get_dependencies`
//!
//! ## Members
//! - `list_methods`, `list_methods_detail`, `list_fields`, `get_annotations`
//!
//! ## Decompile
//! - `decompile_class`, `decompile_method`
//!
//! ## Cross-references
//! - `xrefs_to`, `xrefs_from`, `field_xrefs`, `class_xrefs`, `overrides`,
//!   `unresolved_refs`
//!
//! ## Search and resources
//! - `search_strings`, `get_manifest`, `list_resources`, `get_resource_content`
//!
//! ## Aliases
//! - `rename`, `remove_rename`, `list_renames`
//!
//! ## Diagnostics
//! - `error_report`, `session_info`
//!
//! Session lifecycle (`load_artifact`, `close_session`, `list_sessions`) is handled
//! by the transports themselves.

use std::path::PathBuf;

pub mod cache;
pub mod descriptor;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod extract;
pub mod queries;
pub mod schema;
pub mod server;
pub mod session;

pub use cache::{DecompileSettings, DiskCache};
pub use descriptor::{parse_descriptor, Descriptor};
pub use dispatch::{Dispatcher, Envelope};
pub use error::{ErrorKind, QueryError};
pub use schema::{MethodCategory, MethodSchema, METHOD_SCHEMAS};
pub use server::{AgentServer, RestServer};
pub use session::SessionRegistry;

/// Expand a leading `~/` to `$HOME`.
pub fn expand_path(path: &str) -> PathBuf {
    path.strip_prefix("~/")
        .and_then(|stripped| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(stripped)))
        .unwrap_or_else(|| PathBuf::from(path))
}
