//! Identifier-closure helpers and unresolved-reference detection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

static CONSTANT_RE: LazyLock<Regex> = LazyLock::new(|| {
    // kFoo / K_FOO naming conventions
    Regex::new(r"\b(k[A-Z][a-zA-Z0-9_]*|K_[A-Z0-9_]+)\b").expect("valid constant regex")
});

static BINARY_EXPR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*)\s*[/+\-*%<>=]\s*([a-zA-Z_][a-zA-Z0-9_]*)\b")
        .expect("valid binary expression regex")
});

static SCOPE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z0-9_]*)::(k?[a-zA-Z_][a-zA-Z0-9_]*)\b")
        .expect("valid scope reference regex")
});

/// Key prefix under which struct/class definitions are recorded.
const STRUCT_KEY_PREFIX: &str = "struct_";

/// Identifiers referenced by a piece of definition code, used to seed the
/// next closure round: constant-convention names plus both operands of
/// binary arithmetic/comparison expressions. Expression matches scan left
/// to right without overlap, so in a chain like `a = b / c` the operand
/// after the second operator is not captured.
#[must_use]
pub fn referenced_identifiers(code: &str) -> BTreeSet<String> {
    let mut identifiers: BTreeSet<String> = CONSTANT_RE
        .captures_iter(code)
        .map(|cap| cap[1].to_string())
        .collect();

    for cap in BINARY_EXPR_RE.captures_iter(code) {
        identifiers.insert(cap[1].to_string());
        identifiers.insert(cap[2].to_string());
    }

    identifiers
}

/// `Scope::member` pairs mentioned in code, scope starting uppercase.
#[must_use]
pub fn scope_references(code: &str) -> BTreeSet<(String, String)> {
    SCOPE_REF_RE
        .captures_iter(code)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect()
}

/// Scopes referenced in captured definition text whose own type definition
/// was never captured.
///
/// Flags the case where a constant's value reads `BlockFmhaShape::kK0` but
/// no `struct_BlockFmhaShape` entry describes the type's body. Sorted by
/// name.
#[must_use]
pub fn find_unresolved_references(definitions: &BTreeMap<String, String>) -> Vec<String> {
    let all_code: String = definitions.values().cloned().collect::<Vec<_>>().join("\n");

    let defined: BTreeSet<&str> = definitions
        .keys()
        .filter_map(|key| key.strip_prefix(STRUCT_KEY_PREFIX))
        .collect();

    scope_references(&all_code)
        .into_iter()
        .filter(|(scope, _)| !defined.contains(scope.as_str()))
        .map(|(scope, _)| scope)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
