//! Source and disassembly handlers.
//!
//! Whole-unit text goes through the session's disk cache. Member text is carved
//! out of the cached unit by [`crate::extract`] unless the engine offers an exact
//! span.

use super::{cached_unit_text, require_type, QueryOutput};
use crate::cache::Bucket;
use crate::descriptor::{MethodDescriptor, TypeDescriptor};
use crate::engine::Engine;
use crate::error::QueryError;
use crate::extract::{extract_disasm_member, member_text, Extracted};
use crate::session::Session;
use serde_json::json;
use tracing::debug;

pub fn handle_decompile_class(
    session: &Session,
    engine: &dyn Engine,
    ty: &TypeDescriptor,
) -> Result<QueryOutput, QueryError> {
    let mut warnings = Vec::new();
    let java = cached_unit_text(session, engine, Bucket::Source, ty, &mut warnings)?;
    if java.is_none() {
        require_type(engine, ty)?;
        warnings.push(format!("no decompiled source available for {ty}"));
    }

    Ok(QueryOutput::with_warnings(
        json!({
            "session_id": session.id,
            "type_id": ty.to_string(),
            "java": java,
            "provenance": session.provenance(),
        }),
        warnings,
    ))
}

pub fn handle_decompile_method(
    session: &Session,
    engine: &dyn Engine,
    method: &MethodDescriptor,
) -> Result<QueryOutput, QueryError> {
    let span = engine
        .member_span(method)?
        .ok_or_else(|| QueryError::MethodNotFound(method.to_string()))?;
    let mut warnings = Vec::new();

    let has_exact = span.exact.as_ref().is_some_and(|t| !t.is_empty());
    let extracted: Option<Extracted> = if has_exact {
        Some(member_text("", &span))
    } else {
        match cached_unit_text(session, engine, Bucket::Source, &method.owner, &mut warnings)? {
            Some(unit) => Some(member_text(&unit, &span)),
            None => {
                warnings.push(format!("no decompiled source available for {}", method.owner));
                None
            }
        }
    };
    if let Some(warning) = extracted.as_ref().and_then(|e| e.warning) {
        warnings.push(warning.to_string());
    }

    let smali = match cached_unit_text(session, engine, Bucket::Disasm, &method.owner, &mut warnings)? {
        Some(unit) => {
            let found = extract_disasm_member(&unit, &method.short_id());
            if found.is_none() {
                warnings.push(format!("{} not found in disassembly", method.short_id()));
            }
            found
        }
        None => {
            warnings.push(format!("no disassembly available for {}", method.owner));
            None
        }
    };

    debug!(
        session_id = %session.id,
        method = %method,
        strategy = ?extracted.as_ref().map(|e| e.strategy),
        "Decompiled method"
    );

    let mut locations = serde_json::Map::new();
    if let Some(offset) = span.definition_offset {
        locations.insert("definition_offset".into(), json!(offset));
    }

    Ok(QueryOutput::with_warnings(
        json!({
            "id": method.to_string(),
            "kind": "decompiled_method",
            "java": extracted.as_ref().map(|e| e.text.as_str()),
            "smali": smali,
            "strategy": extracted.as_ref().map(|e| e.strategy),
            "locations": locations,
            "provenance": session.provenance(),
        }),
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{parse_method, parse_type};
    use crate::engine::snapshot::fixtures;
    use crate::extract::FULL_UNIT_WARNING;
    use crate::queries::tests::loaded;
    use crate::queries::Call;

    #[tokio::test]
    async fn test_decompile_class_populates_cache() {
        let (_dir, registry, session) = loaded().await;
        assert!(session
            .cache
            .get(&session.cache_key, Bucket::Source, "com/test/Child")
            .is_none());

        let child = parse_type("Lcom/test/Child;").unwrap();
        let first = Call::DecompileClass(child.clone()).execute(session.clone()).await.unwrap();
        assert_eq!(first.data["java"], fixtures::CHILD_JAVA);
        assert!(first.warnings.is_empty());
        assert_eq!(
            session
                .cache
                .get(&session.cache_key, Bucket::Source, "com/test/Child")
                .as_deref(),
            Some(fixtures::CHILD_JAVA)
        );

        let second = Call::DecompileClass(child).execute(session.clone()).await.unwrap();
        assert_eq!(first, second);
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_decompile_class_unknown_type() {
        let (_dir, registry, session) = loaded().await;
        let missing = parse_type("Lcom/test/Gone;").unwrap();
        let err = Call::DecompileClass(missing).execute(session.clone()).await.unwrap_err();
        assert!(matches!(err, QueryError::TypeNotFound(_)));
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_exact_span_wins() {
        let (_dir, registry, session) = loaded().await;
        let init = parse_method("Lcom/test/Child;-><init>()V").unwrap();
        let out = Call::DecompileMethod(init).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["kind"], "decompiled_method");
        assert_eq!(out.data["strategy"], "exact");
        assert!(out.data["java"].as_str().unwrap().contains("super(\"child\");"));
        let smali = out.data["smali"].as_str().unwrap();
        assert!(smali.starts_with(".method public constructor <init>()V"));
        assert!(smali.ends_with(".end method"));
        assert!(out.warnings.is_empty());
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_brace_depth_from_offset() {
        let (_dir, registry, session) = loaded().await;
        let call = parse_method("Lcom/test/Child;->call(I)Ljava/lang/String;").unwrap();
        let out = Call::DecompileMethod(call).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["strategy"], "brace_depth");
        let java = out.data["java"].as_str().unwrap();
        assert!(java.trim_start().starts_with("public String call(int code) {"));
        assert!(java.ends_with('}'));
        assert!(!java.contains("process"));
        assert_eq!(
            out.data["locations"]["definition_offset"],
            json!(fixtures::CHILD_JAVA.find("public String call").unwrap())
        );
        assert!(out.data["smali"].as_str().unwrap().contains("iget v0"));
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_full_unit_fallback_warns() {
        let (_dir, registry, session) = loaded().await;
        let compute = parse_method("Lcom/test/Helper;->compute(II)I").unwrap();
        let out = Call::DecompileMethod(compute).execute(session.clone()).await.unwrap();
        assert_eq!(out.data["strategy"], "full_unit");
        assert_eq!(out.data["java"], fixtures::HELPER_JAVA);
        assert!(out.data["smali"].is_null());
        assert!(out.warnings.iter().any(|w| w == FULL_UNIT_WARNING));
        assert!(out.data["locations"].as_object().unwrap().is_empty());
        registry.close_all().await;
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_dir, registry, session) = loaded().await;
        let wrong = parse_method("Lcom/test/Child;->call(J)Ljava/lang/String;").unwrap();
        let err = Call::DecompileMethod(wrong).execute(session.clone()).await.unwrap_err();
        assert!(matches!(err, QueryError::MethodNotFound(_)));
        assert_eq!(err.code(), "NOT_FOUND");
        registry.close_all().await;
    }
}
