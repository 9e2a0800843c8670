//! String-literal search over every type's decompiled source.
//!
//! There is no index: each call scans the whole artifact, decompiling through the
//! disk cache, so the first search on a large input is slow and later ones mostly
//! hit the cache.

use super::{cached_unit_text, QueryOutput};
use crate::cache::Bucket;
use crate::descriptor::TypeDescriptor;
use crate::engine::Engine;
use crate::error::QueryError;
use crate::extract::{braced_member_range, string_literals};
use crate::session::Session;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct StringLocation {
    type_id: String,
    method_id: Option<String>,
}

/// Parsed string-search arguments. A regex query is compiled up front.
#[derive(Debug, Clone)]
pub struct StringQuery {
    pub query: String,
    pub regex: bool,
    pub limit: usize,
    matcher: Matcher,
}

impl StringQuery {
    pub fn new(query: &str, regex: bool, limit: usize) -> Result<Self, QueryError> {
        let matcher = if regex {
            Regex::new(query)
                .map(Matcher::Pattern)
                .map_err(|e| QueryError::InvalidPattern(e.to_string()))?
        } else {
            Matcher::Substring(query.to_string())
        };
        Ok(Self {
            query: query.to_string(),
            regex,
            limit,
            matcher,
        })
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Substring(String),
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Substring(needle) => value.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(value),
        }
    }
}

/// Byte ranges of each method body inside `unit`, where they can be located.
fn method_ranges(
    engine: &dyn Engine,
    ty: &TypeDescriptor,
    unit: &str,
) -> anyhow::Result<Vec<(Range<usize>, String)>> {
    let mut ranges = Vec::new();
    for method in engine.methods(ty)?.unwrap_or_default() {
        let desc = method.descriptor(ty);
        let Some(span) = engine.member_span(&desc)? else {
            continue;
        };
        let range = span
            .definition_offset
            .and_then(|offset| braced_member_range(unit, offset))
            .or_else(|| {
                let exact = span.exact.as_deref().filter(|t| !t.is_empty())?;
                unit.find(exact).map(|start| start..start + exact.len())
            });
        if let Some(range) = range {
            ranges.push((range, desc.to_string()));
        }
    }
    Ok(ranges)
}

pub fn handle_search_strings(
    session: &Session,
    engine: &dyn Engine,
    query: &StringQuery,
) -> Result<QueryOutput, QueryError> {
    let matcher = &query.matcher;
    let mut warnings = Vec::new();
    let mut found: BTreeMap<String, Vec<StringLocation>> = BTreeMap::new();

    let mut types = engine.types()?;
    types.sort_by(|a, b| a.raw_name.cmp(&b.raw_name));
    let scanned = types.len();

    for t in types {
        let ty = TypeDescriptor::from_raw(t.raw_name);
        let unit = match cached_unit_text(session, engine, Bucket::Source, &ty, &mut warnings) {
            Ok(Some(unit)) => unit,
            Ok(None) => continue,
            Err(e) => {
                warn!(session_id = %session.id, type_id = %ty, error = %e, "Search skipped type");
                warnings.push(format!("skipped {ty}: {e}"));
                continue;
            }
        };

        let ranges = match method_ranges(engine, &ty, &unit) {
            Ok(ranges) => ranges,
            Err(e) => {
                warnings.push(format!("method attribution unavailable for {ty}: {e:#}"));
                Vec::new()
            }
        };

        for (offset, value) in string_literals(&unit) {
            if !matcher.is_match(&value) {
                continue;
            }
            let location = StringLocation {
                type_id: ty.to_string(),
                method_id: ranges
                    .iter()
                    .find(|(range, _)| range.contains(&offset))
                    .map(|(_, id)| id.clone()),
            };
            let locations = found.entry(value).or_default();
            if !locations.contains(&location) {
                locations.push(location);
            }
        }
    }

    let total_count = found.len();
    let truncated = total_count > query.limit;
    let matches: Vec<_> = found
        .into_iter()
        .take(query.limit)
        .map(|(value, locations)| json!({"value": value, "locations": locations}))
        .collect();
    debug!(
        session_id = %session.id,
        scanned,
        total_count,
        truncated,
        "String search finished"
    );

    let mut out = QueryOutput::with_warnings(
        json!({
            "session_id": session.id,
            "query": query.query,
            "is_regex": query.regex,
            "matches": matches,
            "total_count": total_count,
            "provenance": session.provenance(),
        }),
        warnings,
    );
    out.truncated = truncated;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::tests::loaded;
    use crate::queries::Call;

    fn search(query: &str, regex: bool, limit: usize) -> Call {
        Call::SearchStrings(StringQuery::new(query, regex, limit).unwrap())
    }

    #[tokio::test]
    async fn test_substring_search_attributes_methods() {
        let (_dir, registry, session) = loaded().await;
        let out = search("hild", false, 200).execute(session.clone()).await.unwrap();
        assert!(!out.truncated);
        assert_eq!(out.data["total_count"], 2);
        assert_eq!(
            out.data["matches"],
            json!([
                {"value": "Child", "locations": [
                    {"type_id": "Lcom/test/Child;", "method_id": null}
                ]},
                {"value": "child", "locations": [
                    {"type_id": "Lcom/test/Child;", "method_id": "Lcom/test/Child;-><init>()V"}
                ]}
            ])
        );
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_regex_search_truncates() {
        let (_dir, registry, session) = loaded().await;
        let out = search(r"^:\s?$", true, 1).execute(session.clone()).await.unwrap();
        assert!(out.truncated);
        assert_eq!(out.data["total_count"], 2);
        let matches = out.data["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["value"], ":");
        assert_eq!(
            matches[0]["locations"][0]["method_id"],
            "Lcom/test/Child;->call(I)Ljava/lang/String;"
        );
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_unlocated_method_still_matches() {
        let (_dir, registry, session) = loaded().await;
        let out = search("division", false, 10).execute(session.clone()).await.unwrap();
        let location = &out.data["matches"][0]["locations"][0];
        assert_eq!(location["type_id"], "Lcom/test/Helper;");
        assert!(location["method_id"].is_null());
        registry.close_all().await;
    }

    #[test]
    fn test_invalid_regex() {
        let err = StringQuery::new("(", true, 10).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPattern(_)));
        assert_eq!(err.code(), "INVALID_INPUT");
        // The same text is fine as a substring.
        assert!(StringQuery::new("(", false, 10).is_ok());
    }
}
