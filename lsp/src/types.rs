//! Public types for the language-server client.
//!
//! [`Language`] is a closed set: each variant carries a fixed [`ServerSpec`]
//! naming the server command and its workspace precondition. Unknown language
//! names map to the C/C++ variant explicitly rather than through a silent
//! lookup fallback.

use std::path::{Path, PathBuf};

/// Supported language servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cpp,
    Rust,
    Python,
}

/// Command and precondition for one language server.
///
/// `check_file` must exist in the project root before the server is started;
/// `None` means the server works without project configuration.
#[derive(Debug, Clone, Copy)]
pub struct ServerSpec {
    pub command: &'static str,
    pub args: &'static [&'static str],
    pub check_file: Option<&'static str>,
    /// LSP `languageId` sent in `textDocument/didOpen`.
    pub language_id: &'static str,
}

impl Language {
    /// Map a user-supplied language name to a variant.
    ///
    /// Unrecognized names fall back to [`Language::Cpp`] — the default
    /// variant, not an error.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "c" => Self::C,
            "rust" => Self::Rust,
            "python" => Self::Python,
            _ => Self::Cpp,
        }
    }

    /// The server configuration for this language.
    #[must_use]
    pub fn server_spec(self) -> ServerSpec {
        match self {
            Self::C | Self::Cpp => ServerSpec {
                command: "clangd",
                args: &["--background-index"],
                check_file: Some("compile_commands.json"),
                language_id: "cpp",
            },
            Self::Rust => ServerSpec {
                command: "rust-analyzer",
                args: &[],
                check_file: Some("Cargo.toml"),
                language_id: "rust",
            },
            Self::Python => ServerSpec {
                command: "pyright-langserver",
                args: &["--stdio"],
                check_file: None,
                language_id: "python",
            },
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Rust => "rust",
            Self::Python => "python",
        }
    }
}

/// Detect the language of a source file from its extension.
///
/// Unknown extensions resolve to C++, matching the server fallback.
#[must_use]
pub fn detect_language(path: &Path) -> Language {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("c") => Language::C,
        Some("rs") => Language::Rust,
        Some("py") => Language::Python,
        _ => Language::Cpp,
    }
}

/// LSP `languageId` for a source file, covering extensions beyond the
/// supported-server set (go, ts, js, ...) for `didOpen` payloads.
#[must_use]
pub fn language_id_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("c") => "c",
        Some("rs") => "rust",
        Some("go") => "go",
        Some("py") => "python",
        Some("ts") => "typescript",
        Some("tsx") => "typescriptreact",
        Some("js" | "jsx") => "javascript",
        _ => "cpp",
    }
}

/// A definition target reported by the server, normalized to a path and
/// 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefLocation {
    pub path: PathBuf,
    pub line: u32,
}

/// Failure modes of the client, distinguishable so callers choose how to
/// degrade instead of every failure collapsing into "empty".
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{file} not found in {}", project.display())]
    MissingCheckFile { file: &'static str, project: PathBuf },

    #[error("{command} not found in PATH")]
    ServerNotFound { command: &'static str },

    #[error("language server process unavailable")]
    ProcessUnavailable,

    #[error("language server process exited")]
    ServerDied,

    #[error("no response from language server within {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed response from language server: {0}")]
    Malformed(String),

    #[error("i/o error talking to language server: {0}")]
    Io(#[from] std::io::Error),
}
