//! Outgoing prompt assembly.
//!
//! Auxiliary context travels in the same text channel as the user's prompt:
//! a workspace file manifest first, then each attached file's content, then
//! the literal prompt text.

use crate::textutil::truncate_chars;

/// A file whose content is attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    pub path: String,
    pub content: String,
    pub truncated: bool,
}

impl AttachedFile {
    /// Attach `content`, keeping at most `max_chars` characters.
    pub fn new(path: impl Into<String>, content: &str, max_chars: usize) -> Self {
        let (content, truncated) = truncate_chars(content, max_chars);
        Self {
            path: path.into(),
            content,
            truncated,
        }
    }
}

/// Context folded ahead of a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub workspace_files: Vec<String>,
    pub attached_files: Vec<AttachedFile>,
}

impl PromptContext {
    pub fn is_empty(&self) -> bool {
        self.workspace_files.is_empty() && self.attached_files.is_empty()
    }
}

/// Build the text actually sent for one prompt.
///
/// With no context the prompt is returned unchanged.
pub fn build_prompt(prompt: &str, context: &PromptContext) -> String {
    if context.is_empty() {
        return prompt.to_string();
    }

    let mut out = String::new();
    if !context.workspace_files.is_empty() {
        out.push_str("<workspace_files>\n");
        for path in &context.workspace_files {
            out.push_str(path);
            out.push('\n');
        }
        out.push_str("</workspace_files>\n\n");
    }

    for file in &context.attached_files {
        out.push_str("<attached_file path=\"");
        out.push_str(&escape_attr(&file.path));
        out.push('"');
        if file.truncated {
            out.push_str(" truncated=\"true\"");
        }
        out.push_str(">\n");
        out.push_str(&file.content);
        if !file.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("</attached_file>\n\n");
    }

    out.push_str(prompt);
    out
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
