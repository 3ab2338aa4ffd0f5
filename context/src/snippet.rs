//! Source snippet reading and error-file resolution.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

/// Lines of context captured around an error location.
pub const ERROR_CONTEXT_LINES: u32 = 10;

/// Lines of context captured around a definition target.
pub const DEFINITION_CONTEXT_LINES: u32 = 15;

/// Read ±`context` lines around `line` (1-based), each numbered, with the
/// target line marked `>>>`.
///
/// Returns `None` when the file is missing or unreadable.
#[must_use]
pub fn read_source_snippet(path: &Path, line: u32, context: u32) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return None;
    }

    let target = line.saturating_sub(1) as usize;
    let start = target.saturating_sub(context as usize);
    let end = (target + context as usize + 1).min(lines.len());
    if start >= lines.len() {
        return None;
    }

    let rendered: Vec<String> = (start..end)
        .map(|i| {
            let marker = if i == target { ">>>" } else { "   " };
            format!("{marker} {:4}: {}", i + 1, lines[i])
        })
        .collect();
    Some(rendered.join("\n"))
}

/// Resolve a file named in an error message against the project tree.
///
/// Absolute paths are taken as-is, then relative to the project root, then
/// the first basename match found walking the tree.
#[must_use]
pub fn resolve_file(project_dir: &Path, file: &Path) -> Option<PathBuf> {
    if file.is_absolute() {
        return file.exists().then(|| file.to_path_buf());
    }

    let joined = project_dir.join(file);
    if joined.exists() {
        return Some(joined);
    }

    let basename = file.file_name()?;
    for entry in WalkBuilder::new(project_dir).build().flatten() {
        if entry.file_type().is_some_and(|t| t.is_file()) && entry.file_name() == basename {
            return Some(entry.into_path());
        }
    }
    None
}
