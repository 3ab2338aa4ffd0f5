//! JSON-RPC payload construction and response normalization.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::types::DefLocation;

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

pub(crate) fn initialize_params(root_uri: &str) -> serde_json::Value {
    serde_json::json!({
        "processId": std::process::id(),
        "rootUri": root_uri,
        "capabilities": {},
        "workspaceFolders": [{
            "uri": root_uri,
            "name": "workspace"
        }]
    })
}

pub(crate) fn did_open_params(
    uri: &str,
    language_id: &str,
    version: i32,
    text: &str,
) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

pub(crate) fn did_change_params(uri: &str, version: i32, text: &str) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "version": version
        },
        "contentChanges": [{
            "text": text
        }]
    })
}

/// Params for position-based requests (hover, definition).
///
/// `line`/`col` are 1-based caller coordinates; the wire uses 0-based.
pub(crate) fn position_params(uri: &str, line: u32, col: u32) -> serde_json::Value {
    serde_json::json!({
        "textDocument": { "uri": uri },
        "position": {
            "line": line.saturating_sub(1),
            "character": col.saturating_sub(1)
        }
    })
}

/// Normalize a `textDocument/definition` result.
///
/// The result may be a single `Location`, an array of `Location`, or an
/// array of `LocationLink` (with `targetUri`/`targetRange`). Lines come
/// back 0-based and are converted to 1-based.
pub(crate) fn parse_definition_result(result: &serde_json::Value) -> Vec<DefLocation> {
    let items: Vec<&serde_json::Value> = match result {
        serde_json::Value::Array(arr) => arr.iter().collect(),
        serde_json::Value::Object(_) => vec![result],
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|loc| {
            let uri = loc
                .get("uri")
                .or_else(|| loc.get("targetUri"))?
                .as_str()?;
            let range = loc.get("range").or_else(|| loc.get("targetRange"))?;
            let line = range.get("start")?.get("line")?.as_u64()? as u32;
            Some(DefLocation {
                path: file_uri_to_path(uri)?,
                line: line + 1,
            })
        })
        .collect()
}

/// Normalize a hover `contents` value to a single string.
///
/// Servers send a plain string, a `MarkupContent`/`MarkedString` object with
/// a `value` field, or an array of either; array entries join with newlines.
pub(crate) fn hover_contents_to_string(contents: &serde_json::Value) -> Option<String> {
    match contents {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => {
            map.get("value").and_then(|v| v.as_str()).map(String::from)
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|c| match c {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Object(map) => {
                        map.get("value").and_then(|v| v.as_str()).map(String::from)
                    }
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        _ => None,
    }
}

pub(crate) fn path_to_file_uri(path: &Path) -> Option<url::Url> {
    url::Url::from_file_path(path).ok()
}

pub(crate) fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri).ok().and_then(|u| u.to_file_path().ok())
}
