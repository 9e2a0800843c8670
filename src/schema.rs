//! Method schema table.
//!
//! Every query the service answers is declared here once. The dispatcher validates
//! argument bags against it, the agent transport turns it into tool definitions and
//! the REST transport mounts one route per entry.

use serde::Serialize;
use serde_json::{json, Map, Value};

/// Method category for grouping related queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodCategory {
    /// Type enumeration and structure
    Types,
    /// Methods and fields of one type
    Members,
    /// Source and disassembly text
    Decompile,
    /// Reference graph
    Xrefs,
    /// Full-corpus search
    Search,
    /// Packaged resources and manifest
    Resources,
    /// Display-name overlay
    Aliases,
    /// Session and engine diagnostics
    Diagnostics,
}

impl MethodCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Types => "types",
            Self::Members => "members",
            Self::Decompile => "decompile",
            Self::Xrefs => "xrefs",
            Self::Search => "search",
            Self::Resources => "resources",
            Self::Aliases => "aliases",
            Self::Diagnostics => "diagnostics",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Types => "Enumerate types and packages, hierarchy and dependencies",
            Self::Members => "Methods, fields and annotations of a type",
            Self::Decompile => "Decompiled source and disassembly",
            Self::Xrefs => "Cross-references, overrides and unresolved calls",
            Self::Search => "Search string literals across the artifact",
            Self::Resources => "Manifest and packaged resources",
            Self::Aliases => "Rename overlay (display names only)",
            Self::Diagnostics => "Session info and engine error counts",
        }
    }

    pub fn all() -> &'static [MethodCategory] {
        &[
            Self::Types,
            Self::Members,
            Self::Decompile,
            Self::Xrefs,
            Self::Search,
            Self::Resources,
            Self::Aliases,
            Self::Diagnostics,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Boolean,
    Integer,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
        }
    }

    /// Whether `value` has this JSON type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Integer => value.is_u64() || value.is_i64(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Boolean(bool),
    Integer(u64),
}

impl FieldDefault {
    pub fn to_value(self) -> Value {
        match self {
            Self::Boolean(b) => Value::Bool(b),
            Self::Integer(n) => Value::from(n),
        }
    }
}

/// One declared input of a method.
#[derive(Debug, Clone)]
pub struct InputField {
    pub name: &'static str,
    pub kind: FieldType,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<FieldDefault>,
}

/// Metadata for a single query method.
#[derive(Debug, Clone)]
pub struct MethodSchema {
    pub name: &'static str,
    pub category: MethodCategory,
    /// Path below `/v1/sessions/{id}/` on the REST transport.
    pub route: &'static str,
    pub description: &'static str,
    pub inputs: &'static [InputField],
    /// Whether the method mutates session state.
    pub is_write: bool,
}

impl MethodSchema {
    pub fn input(&self, name: &str) -> Option<&'static InputField> {
        self.inputs.iter().find(|f| f.name == name)
    }

    /// Protocol-facing shape: `{description, input_schema, is_write}`.
    pub fn to_json(&self) -> Value {
        let mut fields = Map::new();
        for field in self.inputs {
            let mut entry = Map::new();
            entry.insert("type".into(), json!(field.kind.as_str()));
            entry.insert("description".into(), json!(field.description));
            if field.required {
                entry.insert("required".into(), json!(true));
            }
            if let Some(default) = field.default {
                entry.insert("default".into(), default.to_value());
            }
            fields.insert(field.name.to_string(), Value::Object(entry));
        }
        json!({
            "description": self.description,
            "input_schema": fields,
            "is_write": self.is_write,
        })
    }

    /// JSON Schema object for agent tool definitions. `session_id` is prepended
    /// as a required string.
    pub fn json_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = vec![json!("session_id")];
        properties.insert(
            "session_id".into(),
            json!({"type": "string", "description": "Session id returned by load_artifact"}),
        );
        for field in self.inputs {
            let mut prop = json!({
                "type": field.kind.as_str(),
                "description": field.description,
            });
            if let Some(default) = field.default {
                prop["default"] = default.to_value();
            }
            properties.insert(field.name.to_string(), prop);
            if field.required {
                required.push(json!(field.name));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), Value::Object(properties));
        schema.insert("required".into(), Value::Array(required));
        schema
    }
}

const fn required(name: &'static str, description: &'static str) -> InputField {
    InputField {
        name,
        kind: FieldType::String,
        description,
        required: true,
        default: None,
    }
}

const fn optional(name: &'static str, description: &'static str) -> InputField {
    InputField {
        name,
        kind: FieldType::String,
        description,
        required: false,
        default: None,
    }
}

const TYPE_ID: InputField = required("type_id", "Type descriptor, e.g. Lcom/example/Foo;");
const METHOD_ID: InputField = required(
    "method_id",
    "Method descriptor, e.g. Lcom/example/Foo;->bar(ILjava/lang/String;)V",
);
const FIELD_ID: InputField = required(
    "field_id",
    "Field descriptor, e.g. Lcom/example/Foo;->count:I",
);
const ENTITY_ID: InputField = required("id", "Type, method or field descriptor");

/// Static table of every query method.
pub static METHOD_SCHEMAS: &[MethodSchema] = &[
    // === TYPES ===
    MethodSchema {
        name: "list_types",
        category: MethodCategory::Types,
        route: "types",
        description: "List every type in the artifact with kind, package and access flags. \
                      Entries carry an `alias` when one was set with rename.",
        inputs: &[],
        is_write: false,
    },
    MethodSchema {
        name: "list_packages",
        category: MethodCategory::Types,
        route: "packages",
        description: "List packages with direct class counts, sub-packages and class ids.",
        inputs: &[],
        is_write: false,
    },
    MethodSchema {
        name: "get_hierarchy",
        category: MethodCategory::Types,
        route: "hierarchy",
        description: "Super class, interfaces, inner classes and generic signature of a type.",
        inputs: &[TYPE_ID],
        is_write: false,
    },
    MethodSchema {
        name: "get_dependencies",
        category: MethodCategory::Types,
        route: "dependencies",
        description: "Types referenced by a type.",
        inputs: &[TYPE_ID],
        is_write: false,
    },
    // === MEMBERS ===
    MethodSchema {
        name: "list_methods",
        category: MethodCategory::Members,
        route: "methods",
        description: "List the methods declared by a type (id, name, access flags).",
        inputs: &[TYPE_ID],
        is_write: false,
    },
    MethodSchema {
        name: "list_methods_detail",
        category: MethodCategory::Members,
        route: "methods/detail",
        description: "List the methods declared by a type with arguments, return type, \
                      throws and generic signature.",
        inputs: &[TYPE_ID],
        is_write: false,
    },
    MethodSchema {
        name: "list_fields",
        category: MethodCategory::Members,
        route: "fields",
        description: "List the fields declared by a type.",
        inputs: &[TYPE_ID],
        is_write: false,
    },
    MethodSchema {
        name: "get_annotations",
        category: MethodCategory::Members,
        route: "annotations",
        description: "Annotations on a type, method or field. Pass exactly one of \
                      type_id, method_id or field_id.",
        inputs: &[
            optional("type_id", "Type descriptor"),
            optional("method_id", "Method descriptor"),
            optional("field_id", "Field descriptor"),
        ],
        is_write: false,
    },
    // === DECOMPILE ===
    MethodSchema {
        name: "decompile_class",
        category: MethodCategory::Decompile,
        route: "decompile/class",
        description: "Decompiled source of a whole type.",
        inputs: &[TYPE_ID],
        is_write: false,
    },
    MethodSchema {
        name: "decompile_method",
        category: MethodCategory::Decompile,
        route: "decompile",
        description: "Decompiled source and disassembly of one method. Falls back to the \
                      whole unit's source with a warning when the method cannot be isolated.",
        inputs: &[METHOD_ID],
        is_write: false,
    },
    // === XREFS ===
    MethodSchema {
        name: "xrefs_to",
        category: MethodCategory::Xrefs,
        route: "xrefs/to",
        description: "Callers of a method.",
        inputs: &[METHOD_ID],
        is_write: false,
    },
    MethodSchema {
        name: "xrefs_from",
        category: MethodCategory::Xrefs,
        route: "xrefs/from",
        description: "Methods, fields and types used by a method.",
        inputs: &[METHOD_ID],
        is_write: false,
    },
    MethodSchema {
        name: "field_xrefs",
        category: MethodCategory::Xrefs,
        route: "xrefs/field",
        description: "Methods that read or write a field.",
        inputs: &[FIELD_ID],
        is_write: false,
    },
    MethodSchema {
        name: "class_xrefs",
        category: MethodCategory::Xrefs,
        route: "xrefs/class",
        description: "Code that references a type.",
        inputs: &[TYPE_ID],
        is_write: false,
    },
    MethodSchema {
        name: "overrides",
        category: MethodCategory::Xrefs,
        route: "overrides",
        description: "Methods that a method overrides or implements, nearest first.",
        inputs: &[METHOD_ID],
        is_write: false,
    },
    MethodSchema {
        name: "unresolved_refs",
        category: MethodCategory::Xrefs,
        route: "unresolved",
        description: "Calls from a method whose targets are outside the artifact.",
        inputs: &[METHOD_ID],
        is_write: false,
    },
    // === SEARCH ===
    MethodSchema {
        name: "search_strings",
        category: MethodCategory::Search,
        route: "strings",
        description: "Search string literals in every type's decompiled source. \
                      Decompiles the whole artifact on first use; slow on large inputs.",
        inputs: &[
            required("query", "Substring to find, or a regex when regex=true"),
            InputField {
                name: "regex",
                kind: FieldType::Boolean,
                description: "Treat query as a regular expression",
                required: false,
                default: Some(FieldDefault::Boolean(false)),
            },
            InputField {
                name: "limit",
                kind: FieldType::Integer,
                description: "Maximum number of distinct matching strings",
                required: false,
                default: Some(FieldDefault::Integer(200)),
            },
        ],
        is_write: false,
    },
    // === RESOURCES ===
    MethodSchema {
        name: "get_manifest",
        category: MethodCategory::Resources,
        route: "manifest",
        description: "Manifest text, for package-style inputs.",
        inputs: &[],
        is_write: false,
    },
    MethodSchema {
        name: "list_resources",
        category: MethodCategory::Resources,
        route: "resources",
        description: "List packaged resource entries.",
        inputs: &[],
        is_write: false,
    },
    MethodSchema {
        name: "get_resource_content",
        category: MethodCategory::Resources,
        route: "resources/content",
        description: "Content of one resource entry. Binary entries carry no text.",
        inputs: &[required("name", "Resource entry name as listed by list_resources")],
        is_write: false,
    },
    // === ALIASES ===
    MethodSchema {
        name: "rename",
        category: MethodCategory::Aliases,
        route: "rename",
        description: "Attach a display alias to a type, method or field. \
                      Decompiled text is never rewritten.",
        inputs: &[ENTITY_ID, required("alias", "Display name")],
        is_write: true,
    },
    MethodSchema {
        name: "remove_rename",
        category: MethodCategory::Aliases,
        route: "rename/remove",
        description: "Remove the alias attached to a descriptor.",
        inputs: &[ENTITY_ID],
        is_write: true,
    },
    MethodSchema {
        name: "list_renames",
        category: MethodCategory::Aliases,
        route: "renames",
        description: "List every alias in the session, ordered by descriptor.",
        inputs: &[],
        is_write: false,
    },
    // === DIAGNOSTICS ===
    MethodSchema {
        name: "error_report",
        category: MethodCategory::Diagnostics,
        route: "errors",
        description: "Decompiler error and warning counts for the artifact.",
        inputs: &[],
        is_write: false,
    },
    MethodSchema {
        name: "session_info",
        category: MethodCategory::Diagnostics,
        route: "info",
        description: "Session metadata: artifact hash, cache key, provenance, timestamps.",
        inputs: &[],
        is_write: false,
    },
];

/// Get method by name
pub fn get_method(name: &str) -> Option<&'static MethodSchema> {
    METHOD_SCHEMAS.iter().find(|m| m.name == name)
}

/// Get method by REST route
pub fn get_by_route(route: &str) -> Option<&'static MethodSchema> {
    METHOD_SCHEMAS.iter().find(|m| m.route == route)
}

pub fn method_names() -> impl Iterator<Item = &'static str> {
    METHOD_SCHEMAS.iter().map(|m| m.name)
}

pub fn methods_by_category(category: MethodCategory) -> impl Iterator<Item = &'static MethodSchema> {
    METHOD_SCHEMAS.iter().filter(move |m| m.category == category)
}

/// The whole table keyed by method name.
pub fn catalog_json() -> Value {
    let methods: Map<String, Value> = METHOD_SCHEMAS
        .iter()
        .map(|m| (m.name.to_string(), m.to_json()))
        .collect();
    Value::Object(methods)
}
