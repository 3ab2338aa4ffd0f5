//! Error parser — pure text-to-structure extraction, no I/O.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

/// A point in source implicated by an error message. Line and column are
/// 1-based; a missing column defaults to 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    pub file: PathBuf,
    pub line: u32,
    pub col: u32,
}

/// A template/generic instantiation named in an error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInstantiation {
    pub template_name: String,
    pub args: Vec<String>,
    /// The matched text as it appeared in the error.
    pub raw: String,
}

static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^\s:]+\.(?:hpp|cpp|h|c|cu|cuh|hip|rs|go|py|ts|tsx|js|jsx)):(\d+)(?::(\d+))?")
        .expect("valid location regex")
});

static QUOTED_IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"`]([a-zA-Z_][a-zA-Z0-9_:]*)['"`]"#).expect("valid quoted identifier regex")
});

static UNDECLARED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"undeclared identifier\s*['"`]?(\w+)"#).expect("valid undeclared regex")
});

static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"requirement\s*['"`]([^'"]+)['"`]"#).expect("valid requirement regex")
});

static BARE_IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*)\b").expect("valid identifier regex"));

static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    // One level of nested angle brackets; deeper nesting is truncated on
    // purpose rather than attempting full bracket balancing.
    Regex::new(r"\b([A-Za-z][a-zA-Z0-9_]*)<([^<>]+(?:<[^<>]*>)?[^<>]*)>")
        .expect("valid template regex")
});

static SEQUENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sequence<([0-9,\s]+)>").expect("valid sequence regex"));

/// Keywords excluded from requirement-expression identifiers.
const EXPR_KEYWORDS: [&str; 10] = [
    "if", "else", "for", "while", "return", "true", "false", "nullptr", "const", "static",
];

/// Extract `path.ext:line[:col]` locations, first match to last.
///
/// Duplicates are kept; consumers that care can dedup downstream.
#[must_use]
pub fn parse_error_locations(error_text: &str) -> Vec<ErrorLocation> {
    LOCATION_RE
        .captures_iter(error_text)
        .filter_map(|cap| {
            let file = PathBuf::from(&cap[1]);
            let line: u32 = cap[2].parse().ok()?;
            let col: u32 = cap
                .get(3)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            Some(ErrorLocation { file, line, col })
        })
        .collect()
}

/// Extract identifiers mentioned in an error message.
///
/// Merges three strategies: quoted tokens (single/double/back quotes),
/// tokens after "undeclared identifier", and bare identifiers inside a
/// quoted static-assert requirement expression.
#[must_use]
pub fn parse_error_identifiers(error_text: &str) -> BTreeSet<String> {
    let mut identifiers: BTreeSet<String> = QUOTED_IDENT_RE
        .captures_iter(error_text)
        .map(|cap| cap[1].to_string())
        .collect();

    identifiers.extend(
        UNDECLARED_RE
            .captures_iter(error_text)
            .map(|cap| cap[1].to_string()),
    );

    for cap in REQUIREMENT_RE.captures_iter(error_text) {
        for ident in BARE_IDENT_RE.captures_iter(&cap[1]) {
            let token = &ident[1];
            if EXPR_KEYWORDS.contains(&token) || token.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            identifiers.insert(token.to_string());
        }
    }

    identifiers
}

/// Extract `Name<args>` instantiations, plus the numeric `sequence<...>`
/// form common in template-heavy diagnostics.
///
/// Args are comma-split without nested-bracket balancing beyond one level;
/// an arg containing a nested template may therefore split mid-argument.
#[must_use]
pub fn parse_template_instantiations(error_text: &str) -> Vec<TemplateInstantiation> {
    let mut instantiations: Vec<TemplateInstantiation> = TEMPLATE_RE
        .captures_iter(error_text)
        .map(|cap| TemplateInstantiation {
            template_name: cap[1].to_string(),
            args: cap[2].split(',').map(|a| a.trim().to_string()).collect(),
            raw: cap[0].to_string(),
        })
        .collect();

    // The dedicated numeric form also surfaces sequences nested inside a
    // larger instantiation; top-level ones were already captured above.
    for cap in SEQUENCE_RE.captures_iter(error_text) {
        if instantiations.iter().any(|i| i.raw == cap[0]) {
            continue;
        }
        instantiations.push(TemplateInstantiation {
            template_name: "sequence".to_string(),
            args: cap[1].split(',').map(|v| v.trim().to_string()).collect(),
            raw: cap[0].to_string(),
        });
    }

    instantiations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_with_line_and_col() {
        let locs = parse_error_locations("foo.cpp:42:13: error: use of undeclared identifier");
        assert_eq!(locs.len(), 1);
        assert_eq!(locs[0].file, PathBuf::from("foo.cpp"));
        assert_eq!(locs[0].line, 42);
        assert_eq!(locs[0].col, 13);
    }

    #[test]
    fn location_col_defaults_to_one() {
        let locs = parse_error_locations("bar.cpp:42: undefined reference to `baz'");
        assert_eq!(locs.len(), 1);
        assert_eq!(locs[0].line, 42);
        assert_eq!(locs[0].col, 1);
    }

    #[test]
    fn locations_keep_appearance_order_and_duplicates() {
        let text = "a.hpp:1:2: note\nb.rs:3: error\na.hpp:1:2: note again";
        let locs = parse_error_locations(text);
        assert_eq!(locs.len(), 3);
        assert_eq!(locs[0].file, PathBuf::from("a.hpp"));
        assert_eq!(locs[1].file, PathBuf::from("b.rs"));
        assert_eq!(locs[2].file, PathBuf::from("a.hpp"));
    }

    #[test]
    fn absolute_paths_are_parsed() {
        let locs = parse_error_locations("/src/kernels/fmha.cuh:812:9: error: no member");
        assert_eq!(locs[0].file, PathBuf::from("/src/kernels/fmha.cuh"));
        assert_eq!(locs[0].line, 812);
        assert_eq!(locs[0].col, 9);
    }

    #[test]
    fn unrecognized_extensions_are_skipped() {
        assert!(parse_error_locations("notes.txt:10: whatever").is_empty());
    }

    #[test]
    fn quoted_identifiers_all_quote_styles() {
        let ids = parse_error_identifiers("expected 'foo' or \"bar\" or `baz`");
        assert!(ids.contains("foo"));
        assert!(ids.contains("bar"));
        assert!(ids.contains("baz"));
    }

    #[test]
    fn undeclared_identifier_extracted() {
        let ids =
            parse_error_identifiers("foo.cpp:42:13: error: use of undeclared identifier 'bar'");
        assert!(ids.contains("bar"));
    }

    #[test]
    fn requirement_expression_identifiers() {
        let ids = parse_error_identifiers(
            "static assertion failed due to requirement '2 <= k0_loops && kN0 > 0'",
        );
        assert!(ids.contains("k0_loops"));
        assert!(ids.contains("kN0"));
        // Numbers and keywords are filtered
        assert!(!ids.contains("2"));
        assert!(!ids.contains("0"));
    }

    #[test]
    fn requirement_keywords_filtered() {
        let ids = parse_error_identifiers("requirement 'x > 0 ? true : false'");
        assert!(ids.contains("x"));
        assert!(!ids.contains("true"));
        assert!(!ids.contains("false"));
    }

    #[test]
    fn identifiers_are_deduplicated() {
        let ids = parse_error_identifiers("'dup' and 'dup' and `dup`");
        assert_eq!(ids.iter().filter(|i| i.as_str() == "dup").count(), 1);
    }

    #[test]
    fn scoped_identifiers_keep_their_scope() {
        let ids = parse_error_identifiers("no member named 'kK0' in 'BlockFmhaShape::Traits'");
        assert!(ids.contains("BlockFmhaShape::Traits"));
    }

    #[test]
    fn simple_template_instantiation() {
        let insts = parse_template_instantiations("Vector<int>");
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].template_name, "Vector");
        assert_eq!(insts[0].args, vec!["int"]);
        assert_eq!(insts[0].raw, "Vector<int>");
    }

    #[test]
    fn template_with_multiple_args() {
        let insts = parse_template_instantiations("Map<Key, Value>");
        assert_eq!(insts[0].args, vec!["Key", "Value"]);
    }

    #[test]
    fn template_with_one_nested_level() {
        let insts = parse_template_instantiations("Kernel<Shape<a, b>, Mode>");
        assert_eq!(insts[0].template_name, "Kernel");
        assert_eq!(insts[0].raw, "Kernel<Shape<a, b>, Mode>");
    }

    #[test]
    fn numeric_sequence_form() {
        let insts = parse_template_instantiations("sequence<32, 64, 32>");
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].template_name, "sequence");
        assert_eq!(insts[0].args, vec!["32", "64", "32"]);
    }

    #[test]
    fn sequence_inside_template_yields_both() {
        let insts = parse_template_instantiations("TileShape<sequence<32, 64>, Mode>");
        let names: Vec<&str> = insts.iter().map(|i| i.template_name.as_str()).collect();
        assert!(names.contains(&"TileShape"));
        assert!(names.contains(&"sequence"));
    }

    #[test]
    fn lowercase_template_names_match() {
        let insts = parse_template_instantiations("vector<int>");
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].template_name, "vector");
        assert_eq!(insts[0].args, vec!["int"]);
    }

    #[test]
    fn bare_sequence_is_reported_once() {
        let insts = parse_template_instantiations("sequence<32, 64, 32>");
        assert_eq!(insts.len(), 1);
    }

    #[test]
    fn clang_style_error_line_end_to_end() {
        let text = "foo.cpp:42:13: error: use of undeclared identifier 'bar'";
        let locs = parse_error_locations(text);
        assert_eq!(
            locs,
            vec![ErrorLocation {
                file: PathBuf::from("foo.cpp"),
                line: 42,
                col: 13
            }]
        );
        assert!(parse_error_identifiers(text).contains("bar"));
    }
}
