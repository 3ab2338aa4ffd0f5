//! Plain-text rendering of a gathered context bundle.

use crate::gather::GatheredContext;

/// Render the bundle for downstream consumption.
///
/// Sections appear only when non-empty, separated by blank lines.
#[must_use]
pub fn format_context(ctx: &GatheredContext) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !ctx.identifiers.is_empty() {
        let idents: Vec<&str> = ctx.identifiers.iter().map(String::as_str).collect();
        parts.push(format!("Identifiers extracted: {}", idents.join(", ")));
    }

    if !ctx.unresolved_refs.is_empty() {
        parts.push(format!(
            "UNRESOLVED REFERENCES: {}",
            ctx.unresolved_refs.join(", ")
        ));
    }

    if !ctx.template_instantiations.is_empty() {
        let mut lines = vec!["TEMPLATE INSTANTIATIONS (from error message):".to_string()];
        for ti in &ctx.template_instantiations {
            lines.push(format!("  {}<{}>", ti.template_name, ti.args.join(", ")));
        }
        parts.push(lines.join("\n"));
    }

    for (location, snippet) in &ctx.source_snippets {
        parts.push(format!("=== SOURCE at {location} ===\n{snippet}"));
    }

    for (name, code) in &ctx.definitions {
        parts.push(format!("=== {name} ===\n{code}"));
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::TemplateInstantiation;

    #[test]
    fn empty_context_renders_empty() {
        assert_eq!(format_context(&GatheredContext::default()), "");
    }

    #[test]
    fn sections_render_in_order() {
        let mut ctx = GatheredContext::default();
        ctx.identifiers.insert("kK0".to_string());
        ctx.unresolved_refs.push("BlockFmhaShape".to_string());
        ctx.template_instantiations.push(TemplateInstantiation {
            template_name: "sequence".to_string(),
            args: vec!["32".to_string(), "64".to_string()],
            raw: "sequence<32, 64>".to_string(),
        });
        ctx.source_snippets
            .insert("a.cpp:42".to_string(), ">>> 42: int x;".to_string());
        ctx.definitions
            .insert("hover_kK0".to_string(), "constexpr int kK0".to_string());

        let out = format_context(&ctx);
        let idents_at = out.find("Identifiers extracted: kK0").unwrap();
        let unresolved_at = out.find("UNRESOLVED REFERENCES: BlockFmhaShape").unwrap();
        let template_at = out.find("  sequence<32, 64>").unwrap();
        let source_at = out.find("=== SOURCE at a.cpp:42 ===").unwrap();
        let def_at = out.find("=== hover_kK0 ===").unwrap();

        assert!(idents_at < unresolved_at);
        assert!(unresolved_at < template_at);
        assert!(template_at < source_at);
        assert!(source_at < def_at);
    }

    #[test]
    fn snippet_body_follows_its_header() {
        let mut ctx = GatheredContext::default();
        ctx.source_snippets
            .insert("b.rs:7".to_string(), ">>>    7: let x = 1;".to_string());
        let out = format_context(&ctx);
        assert!(out.contains("=== SOURCE at b.rs:7 ===\n>>>    7: let x = 1;"));
    }
}
