//! Renderable previews for tool blocks.
//!
//! Extraction is a pure function of a [`ToolBlock`]. Strategies are tried in
//! a fixed order: patch text, then an old/new string pair, then a written
//! content listing, then captured command output. Anything ambiguous yields
//! no preview.

use crate::document::ToolBlock;
use crate::stream::enrich::{
    first_present, COMMAND_KEYS, CONTENT_KEYS, NEW_TEXT_KEYS, OLD_TEXT_KEYS, PATCH_KEYS,
    PATH_KEYS, SEARCH_KEYS,
};
use crate::stream::ToolStatus;
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_COMMAND_MAX_LINES: usize = 40;

/// Broad category of a tool, from its name or the shape of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Write,
    Edit,
    Search,
    Command,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolPreview {
    Diff(DiffPreview),
    Command(CommandPreview),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffPreview {
    pub file_name: String,
    pub added: usize,
    pub removed: usize,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    Add,
    Del,
    Ctx,
    Meta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_no: Option<u32>,
}

impl DiffLine {
    fn new(kind: DiffLineKind, text: &str, line_no: Option<u32>) -> Self {
        Self {
            kind,
            text: text.to_string(),
            line_no,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandPreview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub lines: Vec<String>,
}

const COMMAND_TOKENS: &[&str] = &[
    "bash", "shell", "sh", "command", "cmd", "exec", "execute", "terminal", "run",
];
const EDIT_TOKENS: &[&str] = &["edit", "multiedit", "patch", "replace", "diff", "modify"];
const WRITE_TOKENS: &[&str] = &["write", "create", "save", "new"];
const READ_TOKENS: &[&str] = &["read", "view", "cat", "open", "fetch"];
const SEARCH_TOKENS: &[&str] = &["search", "grep", "find", "glob", "ls", "list", "query"];

/// Classify a tool by name tokens first, falling back to input shape.
pub fn classify(block: &ToolBlock) -> ToolKind {
    let name = block.name.to_ascii_lowercase();
    let tokens: Vec<&str> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has = |set: &[&str]| tokens.iter().any(|token| set.contains(token));

    // Edit before write and search: `search_replace`, `write_or_edit`.
    if has(EDIT_TOKENS) {
        return ToolKind::Edit;
    }
    if has(COMMAND_TOKENS) {
        return ToolKind::Command;
    }
    if has(WRITE_TOKENS) {
        return ToolKind::Write;
    }
    if has(READ_TOKENS) {
        return ToolKind::Read;
    }
    if has(SEARCH_TOKENS) {
        return ToolKind::Search;
    }

    let input = &block.input;
    let present = |keys: &[&str]| first_present(input, keys).is_some();
    if present(PATCH_KEYS) || present(OLD_TEXT_KEYS) {
        ToolKind::Edit
    } else if present(COMMAND_KEYS) {
        ToolKind::Command
    } else if present(CONTENT_KEYS) && present(PATH_KEYS) {
        ToolKind::Write
    } else if present(SEARCH_KEYS) {
        ToolKind::Search
    } else if present(PATH_KEYS) {
        ToolKind::Read
    } else {
        ToolKind::Unknown
    }
}

pub fn extract(block: &ToolBlock) -> Option<ToolPreview> {
    extract_with_limit(block, DEFAULT_COMMAND_MAX_LINES)
}

/// Extract a preview, listing at most `max_lines` lines of command output.
pub fn extract_with_limit(block: &ToolBlock, max_lines: usize) -> Option<ToolPreview> {
    let kind = classify(block);
    let path = first_present(&block.input, PATH_KEYS);

    if let Some(diff) = patch_candidates(block).find_map(|text| parse_patch(&text, path.as_deref()))
    {
        return Some(ToolPreview::Diff(diff));
    }
    if let Some(diff) = pair_diff(block, path.as_deref()) {
        return Some(ToolPreview::Diff(diff));
    }
    if kind == ToolKind::Write {
        if let Some(diff) = written_listing(block, path.as_deref()) {
            return Some(ToolPreview::Diff(diff));
        }
    }
    if kind == ToolKind::Command {
        return Some(ToolPreview::Command(command_preview(block, max_lines)));
    }
    None
}

/// Output first, then the patch keys, then every other string input.
fn patch_candidates(block: &ToolBlock) -> impl Iterator<Item = String> + '_ {
    let output = Some(block.output.clone()).filter(|o| !o.is_empty());
    let keyed = first_present(&block.input, PATCH_KEYS);
    let rest = block
        .input
        .iter()
        .filter(|(key, _)| !PATCH_KEYS.contains(&key.as_str()))
        .filter_map(|(_, value)| value.as_str().map(str::to_string));
    output
        .into_iter()
        .chain(keyed)
        .chain(rest)
        .filter(|text| looks_like_patch(text))
}

fn looks_like_patch(text: &str) -> bool {
    text.starts_with("@@ ")
        || text.contains("\n@@ ")
        || text.contains("diff --git ")
        || text.contains("*** Update File: ")
        || text.contains("*** Add File: ")
        || text.contains("*** Begin Patch")
}

/// Parse `@@ -a[,b] +c[,d] @@` into `(a, b, c, d)`. Omitted counts are 1.
fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32)> {
    let rest = line.strip_prefix("@@ -")?;
    let end = rest.find(" @@")?;
    let (old, new) = rest[..end].split_once(" +")?;
    let range = |spec: &str| -> Option<(u32, u32)> {
        match spec.split_once(',') {
            Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
            None => Some((spec.parse().ok()?, 1)),
        }
    };
    let (old_start, old_count) = range(old)?;
    let (new_start, new_count) = range(new)?;
    Some((old_start, old_count, new_start, new_count))
}

fn header_path(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "/dev/null" {
        return None;
    }
    let raw = raw.split('\t').next().unwrap_or(raw);
    let path = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    Some(path.to_string())
}

#[derive(Default)]
struct HunkCursor {
    old: u32,
    new: u32,
    /// Remaining `(old, new)` lines announced by the header, when it had counts.
    remaining: Option<(u32, u32)>,
}

impl HunkCursor {
    fn exhausted(&self) -> bool {
        matches!(self.remaining, Some((0, 0)))
    }

    fn consume(&mut self, old: bool, new: bool) {
        if let Some((o, n)) = self.remaining.as_mut() {
            if old {
                *o = o.saturating_sub(1);
            }
            if new {
                *n = n.saturating_sub(1);
            }
        }
    }
}

/// Reconstruct a diff from patch text. `None` when no line was added or removed.
fn parse_patch(text: &str, fallback_path: Option<&str>) -> Option<DiffPreview> {
    let mut preview = DiffPreview::default();
    let mut file_name: Option<String> = None;
    let mut hunk: Option<HunkCursor> = None;

    for line in text.lines() {
        if hunk.as_ref().is_some_and(HunkCursor::exhausted) {
            hunk = None;
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            hunk = None;
            if file_name.is_none() {
                file_name = rest.split_whitespace().last().and_then(header_path);
            }
            preview.lines.push(DiffLine::new(DiffLineKind::Meta, line, None));
            continue;
        }
        if let Some(rest) = ["*** Update File: ", "*** Add File: ", "*** Delete File: "]
            .iter()
            .find_map(|marker| line.strip_prefix(marker))
        {
            if file_name.is_none() {
                file_name = header_path(rest);
            }
            hunk = Some(HunkCursor {
                old: 1,
                new: 1,
                remaining: None,
            });
            preview.lines.push(DiffLine::new(DiffLineKind::Meta, line, None));
            continue;
        }
        if line.starts_with("@@") {
            match parse_hunk_header(line) {
                Some((old, old_count, new, new_count)) => {
                    hunk = Some(HunkCursor {
                        old,
                        new,
                        remaining: Some((old_count, new_count)),
                    });
                }
                // Headers without counts (`@@ fn main`) keep the running cursor.
                None => {
                    hunk.get_or_insert(HunkCursor {
                        old: 1,
                        new: 1,
                        remaining: None,
                    });
                }
            }
            preview.lines.push(DiffLine::new(DiffLineKind::Meta, line, None));
            continue;
        }

        let Some(cursor) = hunk.as_mut() else {
            if let Some(rest) = line.strip_prefix("+++ ") {
                if let Some(path) = header_path(rest) {
                    file_name = Some(path);
                }
            }
            preview.lines.push(DiffLine::new(DiffLineKind::Meta, line, None));
            continue;
        };

        if line.starts_with("*** ") {
            preview.lines.push(DiffLine::new(DiffLineKind::Meta, line, None));
        } else if let Some(added) = line.strip_prefix('+') {
            preview
                .lines
                .push(DiffLine::new(DiffLineKind::Add, added, Some(cursor.new)));
            cursor.new = cursor.new.saturating_add(1);
            cursor.consume(false, true);
            preview.added += 1;
        } else if let Some(removed) = line.strip_prefix('-') {
            preview
                .lines
                .push(DiffLine::new(DiffLineKind::Del, removed, Some(cursor.old)));
            cursor.old = cursor.old.saturating_add(1);
            cursor.consume(true, false);
            preview.removed += 1;
        } else if line.is_empty() || line.starts_with(' ') {
            let context = line.strip_prefix(' ').unwrap_or(line);
            preview
                .lines
                .push(DiffLine::new(DiffLineKind::Ctx, context, Some(cursor.new)));
            cursor.old = cursor.old.saturating_add(1);
            cursor.new = cursor.new.saturating_add(1);
            cursor.consume(true, true);
        } else {
            preview.lines.push(DiffLine::new(DiffLineKind::Meta, line, None));
        }
    }

    if preview.added + preview.removed == 0 {
        return None;
    }
    preview.file_name = file_name
        .or_else(|| fallback_path.map(str::to_string))
        .unwrap_or_default();
    Some(preview)
}

fn start_line(block: &ToolBlock) -> u32 {
    let line = match block.input.get("line") {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        _ => None,
    };
    line.unwrap_or(1).max(1)
}

/// Whole old string removed, whole new string added.
fn pair_diff(block: &ToolBlock, path: Option<&str>) -> Option<DiffPreview> {
    let old = first_present(&block.input, OLD_TEXT_KEYS).unwrap_or_default();
    let new = first_present(&block.input, NEW_TEXT_KEYS).unwrap_or_default();
    if old.is_empty() && new.is_empty() {
        return None;
    }
    let start = start_line(block);
    let mut preview = DiffPreview {
        file_name: path.unwrap_or_default().to_string(),
        ..DiffPreview::default()
    };
    for (offset, line) in (0u32..).zip(old.lines()) {
        let line_no = start.saturating_add(offset);
        preview
            .lines
            .push(DiffLine::new(DiffLineKind::Del, line, Some(line_no)));
        preview.removed += 1;
    }
    for (offset, line) in (0u32..).zip(new.lines()) {
        let line_no = start.saturating_add(offset);
        preview
            .lines
            .push(DiffLine::new(DiffLineKind::Add, line, Some(line_no)));
        preview.added += 1;
    }
    Some(preview)
}

fn written_listing(block: &ToolBlock, path: Option<&str>) -> Option<DiffPreview> {
    let content = first_present(&block.input, CONTENT_KEYS)?;
    let lines: Vec<DiffLine> = (1u32..)
        .zip(content.lines())
        .map(|(line_no, line)| DiffLine::new(DiffLineKind::Add, line, Some(line_no)))
        .collect();
    Some(DiffPreview {
        file_name: path.unwrap_or_default().to_string(),
        added: lines.len(),
        removed: 0,
        lines,
    })
}

fn command_preview(block: &ToolBlock, max_lines: usize) -> CommandPreview {
    let max_lines = max_lines.max(1);
    let command = first_present(&block.input, COMMAND_KEYS);
    let output = block.output.trim_end_matches('\n');

    let lines = if output.is_empty() {
        let placeholder = if block.status == ToolStatus::Running {
            "Running..."
        } else {
            "(no output)"
        };
        vec![placeholder.to_string()]
    } else {
        let all: Vec<&str> = output.lines().collect();
        let mut lines: Vec<String> = all.iter().take(max_lines).map(|l| l.to_string()).collect();
        if all.len() > max_lines {
            lines.push(format!("... ({} more lines)", all.len() - max_lines));
        }
        lines
    };

    CommandPreview { command, lines }
}
