//! Engine backed by a JSON analysis export.
//!
//! The export is produced engine-side and carries everything the query surface
//! needs: types with their members, full unit text, member spans, reference edges,
//! resources and diagnostics.

use super::types::*;
use super::{Engine, EngineFactory};
use crate::cache::DecompileSettings;
use crate::descriptor::{FieldDescriptor, MethodDescriptor, TypeDescriptor};
use crate::extract::MemberSpan;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub const BACKEND_NAME: &str = "jadx";

#[derive(Debug, Deserialize)]
pub struct ArtifactModel {
    pub engine_version: String,
    #[serde(default = "default_input_type")]
    pub input_type: String,
    #[serde(default)]
    pub types: Vec<TypeSnapshot>,
    #[serde(default)]
    pub resources: Vec<ResourceSnapshot>,
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub errors_count: u64,
    #[serde(default)]
    pub warnings_count: u64,
}

fn default_input_type() -> String {
    "dex".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TypeSnapshot {
    pub raw_name: String,
    #[serde(default)]
    pub kind: TypeKind,
    #[serde(default)]
    pub access_flags: Vec<String>,
    #[serde(flatten)]
    pub hierarchy: HierarchyModel,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub smali: Option<String>,
    #[serde(default)]
    pub methods: Vec<MethodSnapshot>,
    #[serde(default)]
    pub fields: Vec<FieldSnapshot>,
    #[serde(default)]
    pub used_by: Vec<EngineNode>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
}

#[derive(Debug, Deserialize)]
pub struct MethodSnapshot {
    #[serde(flatten)]
    pub model: MethodModel,
    /// Exact member source, if the exporter could isolate it.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub definition_offset: Option<usize>,
    #[serde(default)]
    pub uses: Vec<EngineNode>,
    #[serde(default)]
    pub used_by: Vec<EngineNode>,
    #[serde(default)]
    pub overrides: Vec<EngineNode>,
    #[serde(default)]
    pub unresolved: Vec<UnresolvedRef>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
    #[serde(default)]
    pub parameter_annotations: Option<Vec<Vec<AnnotationInfo>>>,
}

#[derive(Debug, Deserialize)]
pub struct FieldSnapshot {
    #[serde(flatten)]
    pub model: FieldModel,
    #[serde(default)]
    pub used_by: Vec<EngineNode>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub text: Option<String>,
}

pub struct SnapshotEngine {
    artifact: ArtifactModel,
    by_name: HashMap<String, usize>,
}

impl SnapshotEngine {
    pub fn new(artifact: ArtifactModel) -> Self {
        let by_name = artifact
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.raw_name.clone(), i))
            .collect();
        Self { artifact, by_name }
    }

    pub fn from_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        let artifact: ArtifactModel =
            serde_json::from_slice(bytes).context("artifact is not a valid analysis export")?;
        Ok(Self::new(artifact))
    }

    fn find_type(&self, raw_name: &str) -> Option<&TypeSnapshot> {
        self.by_name.get(raw_name).map(|&i| &self.artifact.types[i])
    }

    fn find_method(&self, method: &MethodDescriptor) -> Option<&MethodSnapshot> {
        self.find_type(method.owner.raw_name())?
            .methods
            .iter()
            .find(|m| m.model.matches(method))
    }

    fn find_field(&self, field: &FieldDescriptor) -> Option<&FieldSnapshot> {
        self.find_type(field.owner.raw_name())?
            .fields
            .iter()
            .find(|f| f.model.name == field.name && f.model.field_type == field.ty)
    }
}

impl Engine for SnapshotEngine {
    fn version(&self) -> &str {
        &self.artifact.engine_version
    }

    fn input_type(&self) -> &str {
        &self.artifact.input_type
    }

    fn types(&self) -> anyhow::Result<Vec<TypeModel>> {
        Ok(self
            .artifact
            .types
            .iter()
            .map(|t| TypeModel {
                raw_name: t.raw_name.clone(),
                kind: t.kind,
                access_flags: t.access_flags.clone(),
            })
            .collect())
    }

    fn hierarchy(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<HierarchyModel>> {
        Ok(self.find_type(ty.raw_name()).map(|t| t.hierarchy.clone()))
    }

    fn methods(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<Vec<MethodModel>>> {
        Ok(self
            .find_type(ty.raw_name())
            .map(|t| t.methods.iter().map(|m| m.model.clone()).collect()))
    }

    fn fields(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<Vec<FieldModel>>> {
        Ok(self
            .find_type(ty.raw_name())
            .map(|t| t.fields.iter().map(|f| f.model.clone()).collect()))
    }

    fn unit_source(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<String>> {
        Ok(self.find_type(ty.raw_name()).and_then(|t| t.source.clone()))
    }

    fn unit_disassembly(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<String>> {
        Ok(self.find_type(ty.raw_name()).and_then(|t| t.smali.clone()))
    }

    fn member_span(&self, method: &MethodDescriptor) -> anyhow::Result<Option<MemberSpan>> {
        Ok(self.find_method(method).map(|m| MemberSpan {
            exact: m.source.clone(),
            definition_offset: m.definition_offset,
        }))
    }

    fn method_uses(&self, method: &MethodDescriptor) -> anyhow::Result<Option<Vec<EngineNode>>> {
        Ok(self.find_method(method).map(|m| m.uses.clone()))
    }

    fn method_used_by(
        &self,
        method: &MethodDescriptor,
    ) -> anyhow::Result<Option<Vec<EngineNode>>> {
        Ok(self.find_method(method).map(|m| m.used_by.clone()))
    }

    fn field_used_by(&self, field: &FieldDescriptor) -> anyhow::Result<Option<Vec<EngineNode>>> {
        Ok(self.find_field(field).map(|f| f.used_by.clone()))
    }

    fn type_used_by(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<Vec<EngineNode>>> {
        Ok(self.find_type(ty.raw_name()).map(|t| t.used_by.clone()))
    }

    fn overrides(&self, method: &MethodDescriptor) -> anyhow::Result<Option<Vec<EngineNode>>> {
        Ok(self.find_method(method).map(|m| m.overrides.clone()))
    }

    fn unresolved_calls(
        &self,
        method: &MethodDescriptor,
    ) -> anyhow::Result<Option<Vec<UnresolvedRef>>> {
        Ok(self.find_method(method).map(|m| m.unresolved.clone()))
    }

    fn type_annotations(
        &self,
        ty: &TypeDescriptor,
    ) -> anyhow::Result<Option<Vec<AnnotationInfo>>> {
        Ok(self.find_type(ty.raw_name()).map(|t| t.annotations.clone()))
    }

    fn method_annotations(
        &self,
        method: &MethodDescriptor,
    ) -> anyhow::Result<Option<MethodAnnotations>> {
        Ok(self.find_method(method).map(|m| MethodAnnotations {
            annotations: m.annotations.clone(),
            parameter_annotations: m.parameter_annotations.clone(),
        }))
    }

    fn field_annotations(
        &self,
        field: &FieldDescriptor,
    ) -> anyhow::Result<Option<Vec<AnnotationInfo>>> {
        Ok(self.find_field(field).map(|f| f.annotations.clone()))
    }

    fn dependencies(&self, ty: &TypeDescriptor) -> anyhow::Result<Option<Vec<String>>> {
        Ok(self.find_type(ty.raw_name()).map(|t| t.dependencies.clone()))
    }

    fn resources(&self) -> anyhow::Result<Vec<ResourceEntry>> {
        Ok(self
            .artifact
            .resources
            .iter()
            .map(|r| ResourceEntry {
                name: r.name.clone(),
                resource_type: r.resource_type.clone(),
                size: r
                    .size
                    .or_else(|| r.text.as_ref().map(|t| t.len() as u64)),
            })
            .collect())
    }

    fn resource_content(&self, name: &str) -> anyhow::Result<Option<ResourceContent>> {
        Ok(self
            .artifact
            .resources
            .iter()
            .find(|r| r.name == name)
            .map(|r| ResourceContent {
                name: r.name.clone(),
                data_type: r.data_type.clone().unwrap_or_else(|| {
                    if r.text.is_some() { "text" } else { "binary" }.to_string()
                }),
                text: r.text.clone(),
            }))
    }

    fn manifest(&self) -> anyhow::Result<Option<String>> {
        Ok(self.artifact.manifest.clone())
    }

    fn diagnostics(&self) -> anyhow::Result<Diagnostics> {
        Ok(Diagnostics {
            errors_count: self.artifact.errors_count,
            warnings_count: self.artifact.warnings_count,
        })
    }
}

/// Loads [`SnapshotEngine`]s from export files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotEngineFactory;

impl EngineFactory for SnapshotEngineFactory {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn create(&self, path: &Path, settings: &DecompileSettings) -> anyhow::Result<Box<dyn Engine>> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let engine = SnapshotEngine::from_slice(&bytes)?;
        debug!(
            path = %path.display(),
            version = %engine.version(),
            types = engine.artifact.types.len(),
            deobfuscation = settings.deobfuscation,
            "Loaded analysis export"
        );
        Ok(Box::new(engine))
    }
}
