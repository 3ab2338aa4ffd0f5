//! Context orchestrator — fuses parsed error data, source snippets, live
//! language-server lookups, and optional structural search into one bundle.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use errscope_lsp::{ClientRegistry, Language, detect_language};

use crate::parse::{
    ErrorLocation, TemplateInstantiation, parse_error_identifiers, parse_error_locations,
    parse_template_instantiations,
};
use crate::refs::{find_unresolved_references, referenced_identifiers};
use crate::search;
use crate::snippet::{
    DEFINITION_CONTEXT_LINES, ERROR_CONTEXT_LINES, read_source_snippet, resolve_file,
};

/// Everything gathered for one error message.
///
/// Definition keys are self-describing of their provenance: `hover_*` from
/// live hover queries, `lsp_def_*` from definition lookups, `struct_*` /
/// `constexpr_*` / `func_*` from structural search, `grep_*` from the text
/// fallback. A consumer can tell the source from the key alone.
#[derive(Debug, Default)]
pub struct GatheredContext {
    /// In order of appearance in the error text.
    pub locations: Vec<ErrorLocation>,
    pub identifiers: BTreeSet<String>,
    pub definitions: BTreeMap<String, String>,
    /// Scope names referenced but never defined in `definitions`, sorted.
    pub unresolved_refs: Vec<String>,
    pub template_instantiations: Vec<TemplateInstantiation>,
    /// Annotated snippets keyed by `file:line`.
    pub source_snippets: BTreeMap<String, String>,
}

/// Knobs for one gather call.
#[derive(Debug, Clone)]
pub struct GatherOptions {
    /// Primary language for structural-search patterns.
    pub language: Language,
    /// Rounds of the identifier closure.
    pub max_depth: u32,
    pub use_language_server: bool,
    /// Off by default: expensive on large source trees.
    pub use_structural_search: bool,
    /// Cap on identifiers processed across all rounds. Depth alone does not
    /// bound the closure; one round can fan out arbitrarily wide.
    pub max_identifiers: usize,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            language: Language::Cpp,
            max_depth: 2,
            use_language_server: true,
            use_structural_search: false,
            max_identifiers: 64,
        }
    }
}

/// Gather context for `error_text` within `project_dir`.
///
/// Best-effort by design: every enrichment step degrades to absence on
/// failure and the call itself always returns a bundle.
pub async fn gather_context(
    error_text: &str,
    project_dir: &Path,
    options: &GatherOptions,
    registry: &mut ClientRegistry,
) -> GatheredContext {
    let mut ctx = GatheredContext {
        locations: parse_error_locations(error_text),
        identifiers: parse_error_identifiers(error_text),
        template_instantiations: parse_template_instantiations(error_text),
        ..GatheredContext::default()
    };

    for i in 0..ctx.locations.len() {
        let loc = ctx.locations[i].clone();
        let Some(path) = resolve_file(project_dir, &loc.file) else {
            tracing::debug!(file = %loc.file.display(), "error location not found on disk");
            continue;
        };

        if let Some(snippet) = read_source_snippet(&path, loc.line, ERROR_CONTEXT_LINES) {
            ctx.source_snippets
                .insert(format!("{}:{}", path.display(), loc.line), snippet);
        }

        if options.use_language_server {
            enrich_location(&mut ctx, &path, &loc, project_dir, registry).await;
        }
    }

    if options.use_structural_search {
        structural_closure(&mut ctx, project_dir, options).await;
    }

    ctx.unresolved_refs = find_unresolved_references(&ctx.definitions);
    ctx
}

/// Hover and definition lookups for one error location.
///
/// The server is chosen per file, not from the options: a C++ build error
/// can name a Python file and still get the right server.
async fn enrich_location(
    ctx: &mut GatheredContext,
    path: &Path,
    loc: &ErrorLocation,
    project_dir: &Path,
    registry: &mut ClientRegistry,
) {
    let language = detect_language(path);
    let client = match registry.get(project_dir, language).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(
                language = language.name(),
                "language server unavailable, continuing without semantic lookups: {e}"
            );
            return;
        }
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match client.get_hover(path, loc.line, loc.col).await {
        Ok(Some(hover)) => {
            ctx.definitions
                .insert(format!("hover_{file_name}:{}:{}", loc.line, loc.col), hover);
        }
        Ok(None) => {}
        Err(e) => tracing::debug!("hover at error location failed: {e}"),
    }

    // Hover every parsed identifier that appears verbatim on the error line.
    if let Ok(text) = std::fs::read_to_string(path) {
        if let Some(line_content) = text.lines().nth(loc.line.saturating_sub(1) as usize) {
            let idents: Vec<String> = ctx.identifiers.iter().cloned().collect();
            for ident in idents {
                let Some(pos) = line_content.find(ident.as_str()) else {
                    continue;
                };
                match client.get_hover(path, loc.line, pos as u32 + 1).await {
                    Ok(Some(hover)) => {
                        ctx.definitions.insert(format!("hover_{ident}"), hover);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::debug!("hover for '{ident}' failed: {e}"),
                }
            }
        }
    }

    match client.get_definition(path, loc.line, loc.col).await {
        Ok(targets) => {
            if let Some(target) = targets.first() {
                if let Some(snippet) =
                    read_source_snippet(&target.path, target.line, DEFINITION_CONTEXT_LINES)
                {
                    ctx.definitions.insert(
                        format!("lsp_def_{file_name}:{}:{}", loc.line, loc.col),
                        snippet,
                    );
                }
            }
        }
        Err(e) => tracing::debug!("definition at error location failed: {e}"),
    }
}

/// Bounded breadth-first closure over identifiers.
///
/// Per identifier, in order: structural search for a type, a constant, a
/// function; else the ripgrep fallback. Type, constant and fallback hits
/// seed the next round with the identifiers they reference.
async fn structural_closure(ctx: &mut GatheredContext, project_dir: &Path, options: &GatherOptions) {
    let lang = options.language.name();
    let mut processed: BTreeSet<String> = BTreeSet::new();
    let mut to_process: Vec<String> = ctx.identifiers.iter().cloned().collect();

    for _depth in 0..options.max_depth {
        if to_process.is_empty() {
            break;
        }
        let batch = std::mem::take(&mut to_process);

        for ident in batch {
            if processed.len() >= options.max_identifiers {
                tracing::debug!(
                    cap = options.max_identifiers,
                    "identifier cap reached, stopping closure"
                );
                return;
            }
            if ident.len() < 2 || processed.contains(&ident) {
                continue;
            }
            processed.insert(ident.clone());

            let struct_def = search::find_struct_definition(&ident, project_dir, lang).await;
            if !struct_def.trim().is_empty() {
                to_process.extend(referenced_identifiers(&struct_def));
                ctx.definitions.insert(format!("struct_{ident}"), struct_def);
                continue;
            }

            let const_def = search::find_const_definition(&ident, project_dir, lang).await;
            if !const_def.trim().is_empty() {
                to_process.extend(referenced_identifiers(&const_def));
                ctx.definitions
                    .insert(format!("constexpr_{ident}"), const_def);
                continue;
            }

            let func_def = search::find_function_definition(&ident, project_dir, lang).await;
            if !func_def.trim().is_empty() {
                ctx.definitions.insert(format!("func_{ident}"), func_def);
                continue;
            }

            let grep_def = search::grep_find_definition(&ident, project_dir).await;
            if !grep_def.is_empty() {
                to_process.extend(referenced_identifiers(&grep_def));
                ctx.definitions.insert(format!("grep_{ident}"), grep_def);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn no_lsp() -> GatherOptions {
        GatherOptions {
            use_language_server: false,
            ..GatherOptions::default()
        }
    }

    #[tokio::test]
    async fn parses_and_snips_without_any_server() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("foo.cpp");
        let content: String = (1..=60).map(|i| format!("int line{i};\n")).collect();
        fs::write(&src, content).unwrap();

        let error = format!(
            "{}:42:13: error: use of undeclared identifier 'bar'",
            src.display()
        );
        let mut registry = ClientRegistry::new();
        let ctx = gather_context(&error, dir.path(), &no_lsp(), &mut registry).await;

        assert_eq!(ctx.locations.len(), 1);
        assert_eq!(ctx.locations[0].line, 42);
        assert!(ctx.identifiers.contains("bar"));

        let key = format!("{}:42", src.display());
        let snippet = ctx.source_snippets.get(&key).expect("snippet captured");
        assert!(snippet.contains(">>>"));
        assert!(snippet.contains("line42"));
        assert!(ctx.definitions.is_empty());
    }

    #[tokio::test]
    async fn degrades_gracefully_when_server_cannot_start() {
        // Language-server use enabled, but the project has no Cargo.toml /
        // compile_commands.json, so no server starts. Locations, identifiers
        // and snippets must still come back; only hover/def keys are absent.
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("foo.cpp");
        fs::write(&src, "int a;\nint b;\nint c;\n").unwrap();

        let error = format!("{}:2:5: error: unknown type name 'woble'", src.display());
        let mut registry = ClientRegistry::new();
        let options = GatherOptions::default();
        let ctx = gather_context(&error, dir.path(), &options, &mut registry).await;

        assert_eq!(ctx.locations.len(), 1);
        assert!(ctx.identifiers.contains("woble"));
        assert_eq!(ctx.source_snippets.len(), 1);
        assert!(!ctx.definitions.keys().any(|k| k.starts_with("hover_")));
        assert!(!ctx.definitions.keys().any(|k| k.starts_with("lsp_def_")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn missing_files_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let error = "ghost.hpp:10:1: error: something about 'spooky'";
        let mut registry = ClientRegistry::new();
        let ctx = gather_context(error, dir.path(), &no_lsp(), &mut registry).await;

        assert_eq!(ctx.locations.len(), 1);
        assert!(ctx.source_snippets.is_empty());
        assert!(ctx.identifiers.contains("spooky"));
    }

    #[tokio::test]
    async fn relative_location_resolved_by_basename() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("include/detail")).unwrap();
        let src = dir.path().join("include/detail/shape.hpp");
        fs::write(&src, "struct S;\nstruct T;\nstruct U;\n").unwrap();

        let error = "shape.hpp:2:1: error: incomplete type 'T'";
        let mut registry = ClientRegistry::new();
        let ctx = gather_context(error, dir.path(), &no_lsp(), &mut registry).await;

        let key = format!("{}:2", src.display());
        assert!(ctx.source_snippets.contains_key(&key));
    }

    #[tokio::test]
    async fn template_instantiations_survive_into_bundle() {
        let mut registry = ClientRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        let ctx = gather_context(
            "error: in TileShape<sequence<32, 64, 32>, Mode>",
            dir.path(),
            &no_lsp(),
            &mut registry,
        )
        .await;

        assert!(
            ctx.template_instantiations
                .iter()
                .any(|t| t.template_name == "TileShape")
        );
        assert!(
            ctx.template_instantiations
                .iter()
                .any(|t| t.template_name == "sequence" && t.args == vec!["32", "64", "32"])
        );
    }

    #[tokio::test]
    async fn closure_fallback_finds_definitions_via_grep() {
        if which::which("rg").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("consts.hpp"),
            "static constexpr int kWarpSize = 32;\n",
        )
        .unwrap();

        let options = GatherOptions {
            use_language_server: false,
            use_structural_search: true,
            ..GatherOptions::default()
        };
        let mut registry = ClientRegistry::new();
        let ctx = gather_context(
            "static assertion failed due to requirement 'kWarpSize <= 64'",
            dir.path(),
            &options,
            &mut registry,
        )
        .await;

        // ast-grep may or may not be installed; either the structural or the
        // grep fallback key must carry the definition.
        let found = ctx
            .definitions
            .iter()
            .any(|(k, v)| (k.ends_with("_kWarpSize")) && v.contains("kWarpSize = 32"));
        assert!(found, "definitions: {:?}", ctx.definitions.keys());
    }

    #[tokio::test]
    async fn closure_respects_identifier_cap() {
        if which::which("rg").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        // Each definition references further constants, fanning out
        fs::write(
            dir.path().join("web.hpp"),
            "static constexpr int kA = kB + kC;\n\
             static constexpr int kB = kD + kE;\n\
             static constexpr int kC = 1;\n\
             static constexpr int kD = 2;\n\
             static constexpr int kE = 3;\n",
        )
        .unwrap();

        let options = GatherOptions {
            use_language_server: false,
            use_structural_search: true,
            max_identifiers: 1,
            max_depth: 5,
            ..GatherOptions::default()
        };
        let mut registry = ClientRegistry::new();
        let ctx = gather_context("requirement 'kA > 0'", dir.path(), &options, &mut registry).await;

        assert!(ctx.definitions.len() <= 1, "cap must bound total work");
    }

    #[tokio::test]
    async fn unresolved_refs_computed_from_gathered_definitions() {
        if which::which("rg").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("consts.hpp"),
            "static constexpr int kK0 = BlockFmhaShape::kK0;\n",
        )
        .unwrap();

        let options = GatherOptions {
            use_language_server: false,
            use_structural_search: true,
            max_depth: 1,
            ..GatherOptions::default()
        };
        let mut registry = ClientRegistry::new();
        let ctx = gather_context("requirement 'kK0 > 0'", dir.path(), &options, &mut registry).await;

        assert!(
            ctx.unresolved_refs.contains(&"BlockFmhaShape".to_string()),
            "definitions: {:?}",
            ctx.definitions
        );
    }

    #[tokio::test]
    async fn empty_error_text_yields_empty_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ClientRegistry::new();
        let ctx = gather_context("", dir.path(), &no_lsp(), &mut registry).await;
        assert!(ctx.locations.is_empty());
        assert!(ctx.identifiers.is_empty());
        assert!(ctx.definitions.is_empty());
        assert!(ctx.unresolved_refs.is_empty());
    }
}
