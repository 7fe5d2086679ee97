//! Tool-input enrichment.
//!
//! Agents report tool inputs in many shapes: `file_path` vs `path`,
//! `oldText` vs `old_string`, diffs in a side-channel `content` list, paths in
//! `locations`. Enrichment folds all of that into one canonical input map so
//! downstream consumers only ever read the canonical keys. Raw keys are kept.

use super::events::ToolInput;
use super::message::{ContentBlock, ToolCallContent, ToolCallUpdate};
use serde_json::{Map, Value};

pub const PATH_KEYS: &[&str] = &[
    "path",
    "file_path",
    "filePath",
    "absolute_path",
    "notebook_path",
    "filename",
];
pub const COMMAND_KEYS: &[&str] = &["command", "cmd", "script"];
pub const OLD_TEXT_KEYS: &[&str] = &["old_string", "oldString", "old_str", "oldText"];
pub const NEW_TEXT_KEYS: &[&str] = &["new_string", "newString", "new_str", "newText"];
pub const CONTENT_KEYS: &[&str] = &["content", "file_text", "contents"];
pub const PATCH_KEYS: &[&str] = &["patch", "diff"];
pub const SEARCH_KEYS: &[&str] = &["pattern", "query", "regex", "glob"];
const OUTPUT_KEYS: &[&str] = &["output", "stdout", "formatted_output", "content", "result", "text"];

/// Canonical key and the candidates it is derived from, in priority order.
const CANONICAL_KEYS: &[(&str, &[&str])] = &[
    ("path", PATH_KEYS),
    ("command", COMMAND_KEYS),
    ("old_string", OLD_TEXT_KEYS),
    ("new_string", NEW_TEXT_KEYS),
    ("content", CONTENT_KEYS),
    ("patch", PATCH_KEYS),
];

/// First candidate key holding a non-empty value, rendered as text.
///
/// Strings are returned as-is; arrays of strings (argv-style commands) are
/// joined with spaces. Other value types never match.
pub fn first_present(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| value_text(map.get(*key)?))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) if !items.is_empty() => {
            let parts: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
            parts.map(|parts| parts.join(" ")).filter(|s| !s.is_empty())
        }
        _ => None,
    }
}

fn has_text(map: &ToolInput, key: &str) -> bool {
    map.get(key).and_then(value_text).is_some()
}

fn insert_missing(map: &mut ToolInput, key: &str, value: Value) {
    let present = match map.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    };
    if !present {
        map.insert(key.to_string(), value);
    }
}

/// Build the canonical input map for one tool call message.
pub fn enrich_tool_input(call: &ToolCallUpdate) -> ToolInput {
    let mut input = match &call.raw_input {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(raw)) if !raw.is_empty() => {
            let mut map = Map::new();
            map.insert("input".to_string(), Value::String(raw.clone()));
            map
        }
        _ => Map::new(),
    };

    for content in &call.content {
        if let ToolCallContent::Diff {
            path,
            old_text,
            new_text,
        } = content
        {
            insert_missing(&mut input, "path", Value::String(path.clone()));
            match old_text.as_deref() {
                Some(old) if !old.is_empty() => {
                    insert_missing(&mut input, "old_string", Value::String(old.to_string()));
                    insert_missing(&mut input, "new_string", Value::String(new_text.clone()));
                }
                _ => insert_missing(&mut input, "content", Value::String(new_text.clone())),
            }
        }
    }

    if let Some(location) = call.locations.first() {
        insert_missing(&mut input, "path", Value::String(location.path.clone()));
        if let Some(line) = location.line {
            insert_missing(&mut input, "line", Value::from(line));
        }
    }

    for (canonical, candidates) in CANONICAL_KEYS {
        if has_text(&input, canonical) {
            continue;
        }
        if let Some(text) = first_present(&input, candidates) {
            input.insert((*canonical).to_string(), Value::String(text));
        }
    }

    input
}

/// Text output carried by a tool call message, if any.
pub fn tool_output_text(call: &ToolCallUpdate) -> Option<String> {
    let texts: Vec<&str> = call
        .content
        .iter()
        .filter_map(|content| match content {
            ToolCallContent::Content {
                content: ContentBlock::Text { text },
            } if !text.is_empty() => Some(text.as_str()),
            _ => None,
        })
        .collect();
    if !texts.is_empty() {
        return Some(texts.join("\n"));
    }

    match call.raw_output.as_ref()? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) if !map.is_empty() => first_present(map, OUTPUT_KEYS)
            .or_else(|| serde_json::to_string_pretty(map).ok()),
        _ => None,
    }
}

/// One-line human description of what a tool call wants to do.
pub fn describe_tool_call(name: &str, call: &ToolCallUpdate, input: &ToolInput) -> String {
    if let Some(title) = call.title.as_deref().filter(|t| !t.trim().is_empty()) {
        return title.trim().to_string();
    }
    if let Some(command) = first_present(input, COMMAND_KEYS) {
        return format!("{name}: {command}");
    }
    if let Some(path) = first_present(input, PATH_KEYS) {
        return format!("{name}: {path}");
    }
    name.to_string()
}
