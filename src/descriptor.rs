//! Canonical descriptors for types, methods and fields.
//!
//! Descriptors are the stable identifiers every query takes and returns. They use
//! the JVM descriptor grammar so they survive engine swaps and repeated loads:
//!
//! ```text
//! Type    Lcom/test/Child;
//! Method  Lcom/test/Child;->call(I)Ljava/lang/String;
//! Field   Lcom/test/Child;->TAG:Ljava/lang/String;
//! ```
//!
//! Raw names are JVM internal names (`com/test/Child$Inner`); dotted names use `.`
//! as the package separator (`com.test.Child$Inner`).

use crate::error::QueryError;
use std::fmt;

/// Primitive type codes, `V` included (valid only as a return type).
pub const PRIMITIVE_CODES: [char; 8] = ['V', 'Z', 'B', 'S', 'I', 'J', 'F', 'D'];

const ARROW: &str = "->";

/// `L<raw/name>;`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDescriptor {
    raw: String,
}

impl TypeDescriptor {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw_name(&self) -> &str {
        &self.raw
    }

    pub fn dotted(&self) -> String {
        self.raw.replace('/', ".")
    }

    /// Dotted package, empty for the default package.
    pub fn package(&self) -> String {
        match self.raw.rfind('/') {
            Some(idx) => self.raw[..idx].replace('/', "."),
            None => String::new(),
        }
    }

    /// Simple name including any `$` nesting, e.g. `Child$Inner`.
    pub fn simple_name(&self) -> &str {
        match self.raw.rfind('/') {
            Some(idx) => &self.raw[idx + 1..],
            None => &self.raw,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{};", self.raw)
    }
}

/// `<owner>-><name>(<params>)<ret>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub owner: TypeDescriptor,
    pub name: String,
    pub params: Vec<String>,
    pub ret: String,
}

impl MethodDescriptor {
    pub fn new(
        owner: TypeDescriptor,
        name: impl Into<String>,
        params: Vec<String>,
        ret: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            name: name.into(),
            params,
            ret: ret.into(),
        }
    }

    /// `<name>(<params>)<ret>`, as disassembly prints it after `.method`.
    pub fn short_id(&self) -> String {
        format!("{}({}){}", self.name, self.params.concat(), self.ret)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_class_init(&self) -> bool {
        self.name == "<clinit>"
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.owner, ARROW, self.short_id())
    }
}

/// `<owner>-><name>:<type>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub owner: TypeDescriptor,
    pub name: String,
    pub ty: String,
}

impl FieldDescriptor {
    pub fn new(owner: TypeDescriptor, name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
            ty: ty.into(),
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}:{}", self.owner, ARROW, self.name, self.ty)
    }
}

fn invalid(input: &str, reason: &'static str) -> QueryError {
    QueryError::InvalidDescriptor {
        input: input.to_string(),
        reason,
    }
}

pub fn parse_type(input: &str) -> Result<TypeDescriptor, QueryError> {
    let Some(rest) = input.strip_prefix('L') else {
        return Err(invalid(input, "missing prefix"));
    };
    let Some(raw) = rest.strip_suffix(';') else {
        return Err(invalid(input, "missing terminator"));
    };
    if raw.is_empty() {
        return Err(invalid(input, "empty name"));
    }
    if raw.contains(';') || raw.contains(ARROW) {
        return Err(invalid(input, "unexpected character in type name"));
    }
    Ok(TypeDescriptor::from_raw(raw))
}

/// Split `owner->rest`, validating the owner half.
fn split_member(input: &str) -> Result<(TypeDescriptor, &str), QueryError> {
    let idx = input
        .find(ARROW)
        .ok_or_else(|| invalid(input, "missing arrow separator"))?;
    let owner = parse_type(&input[..idx])?;
    Ok((owner, &input[idx + ARROW.len()..]))
}

pub fn parse_method(input: &str) -> Result<MethodDescriptor, QueryError> {
    let (owner, rest) = split_member(input)?;
    let open = rest
        .find('(')
        .ok_or_else(|| invalid(input, "missing parenthesis"))?;
    let close = rest
        .find(')')
        .filter(|close| *close > open)
        .ok_or_else(|| invalid(input, "missing parenthesis"))?;

    let name = &rest[..open];
    if name.is_empty() {
        return Err(invalid(input, "empty name"));
    }
    let params = split_type_list(&rest[open + 1..close]).map_err(|reason| invalid(input, reason))?;
    if params.iter().any(|p| p == "V") {
        return Err(invalid(input, "void parameter type"));
    }
    let ret = &rest[close + 1..];
    match split_type_list(ret) {
        Ok(types) if types.len() == 1 => {}
        Ok(_) => return Err(invalid(input, "missing return type")),
        Err(reason) => return Err(invalid(input, reason)),
    }

    Ok(MethodDescriptor::new(owner, name, params, ret))
}

pub fn parse_field(input: &str) -> Result<FieldDescriptor, QueryError> {
    let (owner, rest) = split_member(input)?;
    let colon = rest.find(':').ok_or_else(|| invalid(input, "missing colon"))?;
    let name = &rest[..colon];
    if name.is_empty() {
        return Err(invalid(input, "empty name"));
    }
    let ty = &rest[colon + 1..];
    match split_type_list(ty) {
        Ok(types) if types.len() == 1 && ty != "V" => {}
        Ok(_) => return Err(invalid(input, "invalid field type")),
        Err(reason) => return Err(invalid(input, reason)),
    }
    Ok(FieldDescriptor::new(owner, name, ty))
}

/// Split a concatenated list of type descriptors (`I[Ljava/lang/String;J`) into
/// its elements.
pub fn split_type_list(list: &str) -> Result<Vec<String>, &'static str> {
    let bytes = list.as_bytes();
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i] == b'[' {
            i += 1;
        }
        let Some(&code) = bytes.get(i) else {
            return Err("array without element type");
        };
        if code == b'L' {
            let end = list[i..].find(';').ok_or("unterminated object type")?;
            if end == 1 {
                return Err("empty name");
            }
            i += end + 1;
        } else if PRIMITIVE_CODES.contains(&(code as char)) {
            i += 1;
        } else {
            return Err("invalid type code");
        }
        out.push(list[start..i].to_string());
        start = i;
    }

    Ok(out)
}

/// Any of the three descriptor forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    Type(TypeDescriptor),
    Method(MethodDescriptor),
    Field(FieldDescriptor),
}

impl Descriptor {
    /// Entity-kind tag: `type`, `method` or `field`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Type(_) => "type",
            Self::Method(_) => "method",
            Self::Field(_) => "field",
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(t) => fmt::Display::fmt(t, f),
            Self::Method(m) => fmt::Display::fmt(m, f),
            Self::Field(d) => fmt::Display::fmt(d, f),
        }
    }
}

/// Parse whichever descriptor form `input` has.
pub fn parse_descriptor(input: &str) -> Result<Descriptor, QueryError> {
    match input.split_once(ARROW) {
        None => parse_type(input).map(Descriptor::Type),
        Some((_, member)) if member.contains('(') => parse_method(input).map(Descriptor::Method),
        Some(_) => parse_field(input).map(Descriptor::Field),
    }
}

pub fn raw_name_to_descriptor(raw: &str) -> String {
    format!("L{raw};")
}

pub fn descriptor_to_raw_name(descriptor: &str) -> String {
    descriptor
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(descriptor)
        .to_string()
}

pub fn dotted_to_descriptor(dotted: &str) -> String {
    raw_name_to_descriptor(&dotted.replace('.', "/"))
}

pub fn descriptor_to_dotted(descriptor: &str) -> String {
    descriptor_to_raw_name(descriptor).replace('/', ".")
}
