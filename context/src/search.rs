//! External search tools: ast-grep for structural patterns, ripgrep as the
//! text fallback. Absence of a binary or a timeout degrades to an empty
//! result, never an error.

use std::path::Path;
use std::process::Stdio;
use std::sync::Once;
use std::time::Duration;

use tokio::process::Command;

const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Source extensions the text fallback searches.
const SOURCE_EXTENSIONS: [&str; 12] = [
    "hpp", "cpp", "h", "c", "cu", "cuh", "hip", "rs", "go", "py", "ts", "js",
];

/// Cap on reported fallback matches; beyond that it's noise, not context.
const MAX_GREP_LINES: usize = 20;

static AST_GREP_MISSING: Once = Once::new();
static RIPGREP_MISSING: Once = Once::new();

/// Run a tool and capture stdout, bounded by [`TOOL_TIMEOUT`].
///
/// The child is killed when the timeout drops the future.
async fn run_tool(mut cmd: Command) -> Option<String> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    match tokio::time::timeout(TOOL_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => String::from_utf8(output.stdout).ok(),
        Ok(Err(e)) => {
            tracing::debug!("search tool failed to run: {e}");
            None
        }
        Err(_) => {
            tracing::warn!("search tool timed out after {TOOL_TIMEOUT:?}");
            None
        }
    }
}

/// Run ast-grep with a structural pattern, returning matched code.
pub(crate) async fn ast_grep_search(pattern: &str, dir: &Path, lang: &str) -> String {
    if which::which("ast-grep").is_err() {
        AST_GREP_MISSING.call_once(|| {
            tracing::warn!("ast-grep not found in PATH, structural search disabled");
        });
        return String::new();
    }

    let mut cmd = Command::new("ast-grep");
    cmd.args(["run", "-l", lang, "-p", pattern]).arg(dir);
    run_tool(cmd).await.unwrap_or_default()
}

/// First matching pattern wins; empty string when none match.
async fn first_match(patterns: &[String], dir: &Path, lang: &str) -> String {
    for pattern in patterns {
        let result = ast_grep_search(pattern, dir, lang).await;
        if !result.trim().is_empty() {
            return result;
        }
    }
    String::new()
}

/// Extract a complete struct/class definition by name.
pub(crate) async fn find_struct_definition(name: &str, dir: &Path, lang: &str) -> String {
    let patterns = [
        format!("template <$$$PARAMS> struct {name} {{ $$$BODY }}"),
        format!("struct {name} {{ $$$BODY }}"),
        format!("template <$$$PARAMS> class {name} {{ $$$BODY }}"),
        format!("class {name} {{ $$$BODY }}"),
    ];
    first_match(&patterns, dir, lang).await
}

/// Extract a constant definition (constexpr/const) by name.
pub(crate) async fn find_const_definition(name: &str, dir: &Path, lang: &str) -> String {
    let patterns = [
        format!("static constexpr $TYPE {name} = $EXPR"),
        format!("constexpr $TYPE {name} = $EXPR"),
        format!("const $TYPE {name} = $EXPR"),
    ];
    first_match(&patterns, dir, lang).await
}

/// Extract a complete function definition by name.
pub(crate) async fn find_function_definition(name: &str, dir: &Path, lang: &str) -> String {
    let patterns = [
        format!("$RET {name}($$$ARGS) {{ $$$BODY }}"),
        format!("template <$$$TPARAMS> $RET {name}($$$ARGS) {{ $$$BODY }}"),
    ];
    first_match(&patterns, dir, lang).await
}

/// Language-agnostic definition search via ripgrep.
///
/// Matches definition-shaped lines rather than any usage: constant
/// assignments, type declarations, and function declarations across the
/// language conventions in [`SOURCE_EXTENSIONS`].
pub(crate) async fn grep_find_definition(identifier: &str, dir: &Path) -> String {
    if which::which("rg").is_err() {
        RIPGREP_MISSING.call_once(|| {
            tracing::warn!("rg not found in PATH, text-search fallback disabled");
        });
        return String::new();
    }

    let definition_patterns = [
        format!(r"(static\s+)?constexpr.*\b{identifier}\s*="),
        format!(r"(static\s+)?const.*\b{identifier}\s*="),
        format!(r"\b(struct|class|enum)\s+{identifier}\b"),
        format!(r"\bdef\s+{identifier}\s*\("),
        format!(r"\bfunc\s+{identifier}\s*\("),
        format!(r"\bfn\s+{identifier}\s*[<(]"),
        format!(r"\bfunction\s+{identifier}\s*\("),
        format!(r"\b{identifier}\s*=\s*function"),
    ];
    let combined: Vec<String> = definition_patterns
        .iter()
        .map(|p| format!("({p})"))
        .collect();
    let combined = combined.join("|");

    let globs = SOURCE_EXTENSIONS
        .iter()
        .map(|ext| format!("*.{ext}"))
        .collect::<Vec<_>>()
        .join(",");

    let mut cmd = Command::new("rg");
    cmd.args(["-n", "--glob", &format!("{{{globs}}}"), "-e", &combined])
        .arg(dir);

    let Some(stdout) = run_tool(cmd).await else {
        return String::new();
    };
    stdout
        .lines()
        .take(MAX_GREP_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}
