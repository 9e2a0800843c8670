//! Decompilation engine capability and its per-session worker thread.
//!
//! The engine is an opaque, non-reentrant collaborator. Each session owns one
//! [`EngineWorker`], which runs the engine on a dedicated thread and serializes
//! every job sent to it.

mod loop_impl;
mod request;
pub mod snapshot;
pub mod types;
mod worker;

pub use snapshot::{SnapshotEngine, SnapshotEngineFactory};
pub use types::*;
pub use worker::EngineWorker;

use crate::cache::DecompileSettings;
use crate::descriptor::{FieldDescriptor, MethodDescriptor, TypeDescriptor};
use crate::extract::MemberSpan;
use std::path::Path;

/// Query capability over one loaded artifact.
///
/// Lookups return `Ok(None)` when the entity is unknown to the engine; `Err` is
/// reserved for the engine failing while answering.
pub trait Engine: Send {
    fn version(&self) -> &str;
    fn input_type(&self) -> &str;

    fn types(&self) -> anyhow::Result<Vec<TypeModel>>;
    fn hierarchy(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<HierarchyModel>>;
    fn methods(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<Vec<MethodModel>>>;
    fn fields(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<Vec<FieldModel>>>;

    /// Full source text of the unit declaring `ty`.
    fn unit_source(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<String>>;
    /// Full disassembly text of the unit declaring `ty`.
    fn unit_disassembly(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<String>>;
    /// Where the method lives inside its unit source.
    fn member_span(&self, method: &MethodDescriptor) -> anyhow::Result<Option<MemberSpan>>;

    fn method_uses(&self, method: &MethodDescriptor) -> anyhow::Result<Option<Vec<EngineNode>>>;
    fn method_used_by(&self, method: &MethodDescriptor)
        -> anyhow::Result<Option<Vec<EngineNode>>>;
    fn field_used_by(&self, field: &FieldDescriptor) -> anyhow::Result<Option<Vec<EngineNode>>>;
    fn type_used_by(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<Vec<EngineNode>>>;
    /// Methods the given method overrides or implements, nearest first.
    fn overrides(&self, method: &MethodDescriptor) -> anyhow::Result<Option<Vec<EngineNode>>>;
    fn unresolved_calls(&self, method: &MethodDescriptor)
        -> anyhow::Result<Option<Vec<UnresolvedRef>>>;

    fn type_annotations(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<Vec<AnnotationInfo>>>;
    fn method_annotations(
        &self,
        method: &MethodDescriptor,
    ) -> anyhow::Result<Option<MethodAnnotations>>;
    fn field_annotations(
        &self,
        field: &FieldDescriptor,
    ) -> anyhow::Result<Option<Vec<AnnotationInfo>>>;
    /// Raw names of the types `ty` depends on.
    fn dependencies(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<Vec<String>>>;

    fn resources(&self) -> anyhow::Result<Vec<ResourceEntry>>;
    fn resource_content(&self, name: &str) -> anyhow::Result<Option<ResourceContent>>;
    /// Manifest text, for package-style inputs only.
    fn manifest(&self) -> anyhow::Result<Option<String>>;
    fn diagnostics(&self) -> anyhow::Result<Diagnostics>;
}

/// Builds an [`Engine`] for one artifact. Called on the session's worker thread.
pub trait EngineFactory: Send + Sync {
    /// Backend name reported in provenance.
    fn name(&self) -> &'static str;
    fn create(&self, path: &Path, settings: &DecompileSettings) -> anyhow::Result<Box<dyn Engine>>;
}
