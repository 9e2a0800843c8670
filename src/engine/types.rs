//! Model types produced by the decompilation engine.
//!
//! These mirror what the engine knows about an artifact. Type names inside them
//! are raw names (`com/test/Child`); argument, return and field types are type
//! descriptors (`I`, `Ljava/lang/String;`).

use crate::descriptor::{MethodDescriptor, TypeDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    #[default]
    Class,
    Interface,
    Enum,
    Annotation,
}

/// Summary of one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeModel {
    pub raw_name: String,
    #[serde(default)]
    pub kind: TypeKind,
    #[serde(default)]
    pub access_flags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyModel {
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub inner_classes: Vec<String>,
    pub generic_parameters: Vec<String>,
    pub generic_super_class: Option<String>,
    pub generic_interfaces: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodModel {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    pub return_type: String,
    #[serde(default)]
    pub access_flags: Vec<String>,
    #[serde(default)]
    pub throws: Vec<String>,
    #[serde(default)]
    pub generic_arguments: Vec<String>,
    #[serde(default)]
    pub generic_return_type: Option<String>,
}

impl MethodModel {
    pub fn descriptor(&self, owner: &TypeDescriptor) -> MethodDescriptor {
        MethodDescriptor::new(
            owner.clone(),
            self.name.clone(),
            self.arguments.clone(),
            self.return_type.clone(),
        )
    }

    pub fn matches(&self, method: &MethodDescriptor) -> bool {
        self.name == method.name && self.arguments == method.params && self.return_type == method.ret
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldModel {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub access_flags: Vec<String>,
}

/// A reference target as the engine reports it.
///
/// The engine has distinct node types for classes, methods and fields; they
/// arrive here as a loosely typed record and are normalized at the query
/// boundary. Kinds other than `class`, `method` and `field` are possible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineNode {
    pub kind: String,
    /// Raw name of the declaring type (or of the class itself for `class`).
    pub declaring_type: Option<String>,
    pub name: Option<String>,
    pub arguments: Vec<String>,
    pub return_type: Option<String>,
    pub field_type: Option<String>,
}

/// A call whose target is not defined in the loaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedRef {
    pub parent_class: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arg_types: Vec<String>,
    pub return_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationValue {
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<AnnotationValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Box<AnnotationInfo>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationInfo {
    pub annotation_class: String,
    pub visibility: String,
    #[serde(default)]
    pub values: BTreeMap<String, AnnotationValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodAnnotations {
    pub annotations: Vec<AnnotationInfo>,
    pub parameter_annotations: Option<Vec<Vec<AnnotationInfo>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContent {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub errors_count: u64,
    pub warnings_count: u64,
}

/// What the engine reports about itself once an artifact is loaded.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub backend: String,
    pub version: String,
    pub input_type: String,
    pub class_count: usize,
}
