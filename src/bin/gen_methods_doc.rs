use jadxd::schema::{methods_by_category, MethodCategory, MethodSchema, METHOD_SCHEMAS};
use std::fmt::Write as _;

fn category_title(cat: MethodCategory) -> &'static str {
    match cat {
        MethodCategory::Types => "Types",
        MethodCategory::Members => "Members",
        MethodCategory::Decompile => "Decompile",
        MethodCategory::Xrefs => "Xrefs",
        MethodCategory::Search => "Search",
        MethodCategory::Resources => "Resources",
        MethodCategory::Aliases => "Aliases",
        MethodCategory::Diagnostics => "Diagnostics",
    }
}

fn inputs_cell(method: &MethodSchema) -> String {
    if method.inputs.is_empty() {
        return "none".to_string();
    }
    method
        .inputs
        .iter()
        .map(|field| {
            let mut cell = format!("`{}`: {}", field.name, field.kind.as_str());
            if let Some(default) = field.default {
                let _ = write!(cell, " = {}", default.to_value());
            } else if !field.required {
                cell.push_str(" (optional)");
            }
            cell
        })
        .collect::<Vec<_>>()
        .join("<br>")
}

fn main() {
    let mut out = String::new();
    let _ = writeln!(out, "# Methods\n");
    let _ = writeln!(
        out,
        "> Auto-generated from `src/schema.rs`. Do not edit by hand."
    );
    let _ = writeln!(
        out,
        "> Regenerate with: `cargo run --bin gen_methods_doc -- docs/METHODS.md`.\n"
    );

    let _ = writeln!(out, "## Workflow\n");
    let _ = writeln!(
        out,
        "- `load_artifact(path, settings?)` returns a `session_id` (currently {} query methods)",
        METHOD_SCHEMAS.len()
    );
    let _ = writeln!(
        out,
        "- MCP: every method below is a tool taking `session_id` plus its inputs"
    );
    let _ = writeln!(
        out,
        "- REST: `POST /v1/sessions/{{id}}/<route>` with the inputs as a JSON body, \
         or `POST /v1/call` with `{{session_id, method, args}}`"
    );
    let _ = writeln!(out, "- `close_session(session_id)` releases the engine\n");

    for &cat in MethodCategory::all() {
        let mut methods: Vec<&MethodSchema> = methods_by_category(cat).collect();
        if methods.is_empty() {
            continue;
        }
        methods.sort_by_key(|m| m.name);
        let _ = writeln!(out, "## {} (`{}`)\n", category_title(cat), cat.as_str());
        let _ = writeln!(out, "{}", cat.description());
        let _ = writeln!(out, "\n| Method | Route | Inputs | Description |");
        let _ = writeln!(out, "|--------|-------|--------|-------------|");
        for m in methods {
            let _ = writeln!(
                out,
                "| `{}`{} | `{}` | {} | {} |",
                m.name,
                if m.is_write { " (write)" } else { "" },
                m.route,
                inputs_cell(m),
                m.description
            );
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Notes\n");
    let _ = writeln!(
        out,
        "- Identifiers are descriptors: `Lpkg/Foo;`, `Lpkg/Foo;->bar(I)V`, `Lpkg/Foo;->count:I`"
    );
    let _ = writeln!(
        out,
        "- Every result is an envelope `{{ok, query, args, data?, error?, warnings, truncated}}`"
    );
    let _ = writeln!(
        out,
        "- Errors are `CODE: message` with CODE one of NOT_FOUND, INVALID_INPUT, LOAD_FAILED, \
         UPSTREAM_FAILURE, INTERNAL"
    );
    let _ = writeln!(
        out,
        "- Aliases are display-only; decompiled text never changes after a rename"
    );

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        if let Err(err) = std::fs::write(&args[1], out) {
            eprintln!("failed to write {}: {}", args[1], err);
            std::process::exit(1);
        }
    } else {
        print!("{out}");
    }
}
