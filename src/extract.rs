//! Best-effort extraction of one member's text from a unit's full text.
//!
//! Engines often expose text per compilation unit only. These helpers carve a
//! single method out of that text. Nothing here fails: a miss is `None`, and the
//! [`member_text`] policy falls back to the whole unit with a warning.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Disassembly directive opening a method body.
pub const METHOD_START: &str = ".method";
/// Disassembly directive closing a method body.
pub const METHOD_END: &str = ".end method";

pub const FULL_UNIT_WARNING: &str =
    "member source could not be isolated; full unit text substituted";

/// What the engine knows about where a member lives in its unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSpan {
    /// Exact member text, when the engine can produce it.
    #[serde(default)]
    pub exact: Option<String>,
    /// Byte offset of the member definition inside the unit source.
    #[serde(default)]
    pub definition_offset: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Exact,
    BraceDepth,
    FullUnit,
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub strategy: Strategy,
    pub warning: Option<&'static str>,
}

/// Pick member text: exact engine text, then brace matching from the definition
/// offset, then the full unit.
pub fn member_text(unit_text: &str, span: &MemberSpan) -> Extracted {
    if let Some(exact) = span.exact.as_ref().filter(|t| !t.is_empty()) {
        return Extracted {
            text: exact.clone(),
            strategy: Strategy::Exact,
            warning: None,
        };
    }

    if let Some(text) = span
        .definition_offset
        .and_then(|offset| extract_braced_member(unit_text, offset))
    {
        return Extracted {
            text,
            strategy: Strategy::BraceDepth,
            warning: None,
        };
    }

    Extracted {
        text: unit_text.to_string(),
        strategy: Strategy::FullUnit,
        warning: Some(FULL_UNIT_WARNING),
    }
}

/// Extract one method from disassembly text by its short identifier
/// (`name(args)ret`).
pub fn extract_disasm_member(text: &str, short_id: &str) -> Option<String> {
    let mut lines = text.lines();
    let mut out = Vec::new();

    for line in lines.by_ref() {
        let trimmed = line.trim();
        if trimmed.starts_with(METHOD_START)
            && !trimmed.starts_with(METHOD_END)
            && trimmed.split_whitespace().last() == Some(short_id)
        {
            out.push(line);
            break;
        }
    }
    if out.is_empty() {
        return None;
    }

    for line in lines {
        out.push(line);
        if line.trim() == METHOD_END {
            break;
        }
    }

    Some(out.join("\n"))
}

/// Extract a member whose definition starts at `offset` by matching braces.
///
/// The span starts at the beginning of the definition's line so modifiers and
/// annotations on that line are kept. String and character literals and comments
/// are skipped while counting. A definition that reaches `;` before any `{` has
/// no body and ends at that `;`.
pub fn extract_braced_member(text: &str, offset: usize) -> Option<String> {
    braced_member_range(text, offset).map(|range| text[range].to_string())
}

/// Byte range of the member [`extract_braced_member`] would return.
pub fn braced_member_range(text: &str, offset: usize) -> Option<Range<usize>> {
    if offset >= text.len() || !text.is_char_boundary(offset) {
        return None;
    }
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = offset;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_literal(bytes, i)?;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = bytes[i..]
                    .iter()
                    .position(|b| *b == b'\n')
                    .map(|p| i + p)
                    .unwrap_or(bytes.len());
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text[i + 2..].find("*/").map(|p| i + 2 + p + 2)?;
                continue;
            }
            b';' if depth == 0 => return Some(line_start..i + 1),
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(line_start..i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// String literals in source text with their byte offsets, comments skipped.
///
/// Common escapes are decoded; unknown escapes are kept verbatim.
pub fn string_literals(text: &str) -> Vec<(usize, String)> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => match skip_literal(bytes, i) {
                Some(end) => {
                    out.push((i, unescape(&text[i + 1..end - 1])));
                    i = end;
                }
                None => i += 1,
            },
            b'\'' => i = skip_literal(bytes, i).unwrap_or(i + 1),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = bytes[i..]
                    .iter()
                    .position(|b| *b == b'\n')
                    .map(|p| i + p)
                    .unwrap_or(bytes.len());
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text[i + 2..]
                    .find("*/")
                    .map(|p| i + 2 + p + 2)
                    .unwrap_or(bytes.len());
            }
            _ => i += 1,
        }
    }

    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other @ ('"' | '\'' | '\\')) => out.push(other),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Return the index just past the literal opened at `start`.
fn skip_literal(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            b'\n' => return None,
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALI: &str = "\
.class public Lcom/test/Child;
.super Lcom/test/Base;

.method public constructor <init>()V
    .registers 2
    const-string v0, \"child\"
    invoke-direct {p0, v0}, Lcom/test/Base;-><init>(Ljava/lang/String;)V
    return-void
.end method

.method public call(I)Ljava/lang/String;
    .registers 4
    iget v0, p0, Lcom/test/Child;->counter:I
    add-int/lit8 v0, v0, 0x1
    iput v0, p0, Lcom/test/Child;->counter:I
    return-object v1
.end method

.method public process()V
    .registers 3
    const/16 v0, 0x2a
    invoke-virtual {p0, v0}, Lcom/test/Child;->call(I)Ljava/lang/String;
    return-void
.end method
";

    #[test]
    fn test_disasm_member_isolated() {
        let span = extract_disasm_member(SMALI, "call(I)Ljava/lang/String;").unwrap();
        assert!(span.starts_with(".method public call(I)Ljava/lang/String;"));
        assert!(span.ends_with(".end method"));
        assert!(span.contains("add-int/lit8"));
        assert!(!span.contains("<init>"));
        assert!(!span.contains("process()V"));
        assert!(!span.contains("const/16"));
    }

    #[test]
    fn test_disasm_member_absent() {
        assert!(extract_disasm_member(SMALI, "missing()V").is_none());
        // A call site mentioning the identifier is not a definition.
        assert!(extract_disasm_member(SMALI, "call(I)").is_none());
    }

    #[test]
    fn test_disasm_constructor() {
        let span = extract_disasm_member(SMALI, "<init>()V").unwrap();
        assert!(span.contains("const-string v0, \"child\""));
        assert_eq!(span.lines().count(), 6);
    }

    const JAVA: &str = r#"package com.test;

public class Child extends Base implements Callable {
    private static final String TAG = "Child";

    @Override
    public String call(int code) {
        String s = "quote \" and { brace";
        char c = '}';
        // } in a comment
        if (code > 0) {
            counter++;
        }
        return getName() + ":" + code + s + c;
    }

    public abstract void later(int x);

    public void process() {
        Helper.log(TAG, call(42));
    }
}
"#;

    #[test]
    fn test_braces_inside_literals_do_not_desync() {
        let offset = JAVA.find("public String call").unwrap();
        let span = extract_braced_member(JAVA, offset).unwrap();
        assert!(span.starts_with("    public String call(int code) {"));
        assert!(span.trim_end().ends_with("return getName() + \":\" + code + s + c;\n    }"));
        assert!(!span.contains("process"));
        assert!(!span.contains("later"));
    }

    #[test]
    fn test_bodyless_member_ends_at_semicolon() {
        let offset = JAVA.find("public abstract void later").unwrap();
        let span = extract_braced_member(JAVA, offset).unwrap();
        assert_eq!(span, "    public abstract void later(int x);");
    }

    #[test]
    fn test_line_start_keeps_modifiers() {
        let offset = JAVA.find("process()").unwrap();
        let span = extract_braced_member(JAVA, offset).unwrap();
        assert!(span.starts_with("    public void process() {"));
        assert!(span.ends_with('}'));
    }

    #[test]
    fn test_string_literals_skip_comments_and_chars() {
        let literals = string_literals(JAVA);
        let values: Vec<&str> = literals.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["Child", "quote \" and { brace", ":"]);
        assert_eq!(&JAVA[literals[0].0..literals[0].0 + 7], "\"Child\"");
    }

    #[test]
    fn test_offset_out_of_range() {
        assert!(extract_braced_member(JAVA, JAVA.len() + 10).is_none());
    }

    #[test]
    fn test_member_text_policy() {
        let exact = member_text(
            JAVA,
            &MemberSpan {
                exact: Some("void x() {}".to_string()),
                definition_offset: Some(0),
            },
        );
        assert_eq!(exact.strategy, Strategy::Exact);
        assert_eq!(exact.text, "void x() {}");

        let braced = member_text(
            JAVA,
            &MemberSpan {
                exact: None,
                definition_offset: JAVA.find("public void process"),
            },
        );
        assert_eq!(braced.strategy, Strategy::BraceDepth);
        assert!(braced.warning.is_none());

        let full = member_text(JAVA, &MemberSpan::default());
        assert_eq!(full.strategy, Strategy::FullUnit);
        assert_eq!(full.text, JAVA);
        assert_eq!(full.warning, Some(FULL_UNIT_WARNING));
    }
}
