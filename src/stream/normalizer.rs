//! Session message to stream event normalization.
//!
//! One normalizer lives for one run. It owns the inline-reasoning splitter,
//! the "implicit reasoning" flag for native thought chunks, and the identity
//! (name + label) of every tool call seen so far so later status updates that
//! omit the name still land on the right block.

use super::enrich::{enrich_tool_input, tool_output_text};
use super::events::{StreamEvent, ToolInput, ToolStatus};
use super::message::{InteractiveRequest, SessionMessage, StopReason, ToolCallStatus, ToolCallUpdate};
use super::tags::{TagSegment, TagSplitter};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone)]
struct ToolIdentity {
    name: String,
    label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventNormalizer {
    splitter: TagSplitter,
    implicit_reasoning: bool,
    tools: HashMap<String, ToolIdentity>,
}

impl EventNormalizer {
    /// Normalizer using custom inline reasoning markers.
    pub fn with_markers(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            splitter: TagSplitter::new(open, close),
            implicit_reasoning: false,
            tools: HashMap::new(),
        }
    }

    /// Start a new run: drop held-back text, reasoning state and tool names.
    pub fn reset(&mut self) {
        self.splitter.reset();
        self.implicit_reasoning = false;
        self.tools.clear();
    }

    pub fn normalize(&mut self, message: &SessionMessage) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        match message {
            SessionMessage::AssistantReasoning(content) => {
                if !self.implicit_reasoning {
                    self.implicit_reasoning = true;
                    out.push(StreamEvent::ReasoningStart);
                }
                if !content.is_empty() {
                    out.push(StreamEvent::ReasoningContent {
                        content: content.clone(),
                    });
                }
            }
            SessionMessage::AssistantText(text) => {
                self.close_implicit(&mut out);
                let segments = self.splitter.parse(text);
                out.extend(segments.into_iter().map(segment_event));
            }
            SessionMessage::AssistantResource {
                uri,
                text,
                mime_type,
            } => {
                self.close_implicit(&mut out);
                let path = path_from_uri(uri);
                out.push(StreamEvent::CodeStart {
                    lang: language_for(&path, mime_type.as_deref()),
                    filename: Some(path),
                });
                if !text.is_empty() {
                    out.push(StreamEvent::CodeContent {
                        content: text.clone(),
                    });
                }
                out.push(StreamEvent::CodeEnd);
            }
            SessionMessage::AssistantLink {
                uri,
                line_start,
                line_end,
            } => {
                self.close_implicit(&mut out);
                out.push(StreamEvent::FileRef {
                    path: path_from_uri(uri),
                    line_start: *line_start,
                    line_end: *line_end,
                });
            }
            SessionMessage::ToolCall(call) => {
                self.close_implicit(&mut out);
                self.tool_events(call, &mut out);
            }
            SessionMessage::Plan(entries) => {
                self.close_implicit(&mut out);
                out.push(StreamEvent::Plan {
                    entries: entries.clone(),
                });
            }
            SessionMessage::Error(message) => {
                self.close_implicit(&mut out);
                out.push(StreamEvent::error(message.clone()));
            }
            SessionMessage::Finished(reason) => self.finish(*reason, &mut out),
        }
        out
    }

    /// Events closing out a run that ended for `reason`.
    pub fn finish_run(&mut self, reason: StopReason) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        self.finish(reason, &mut out);
        out
    }

    /// Events announcing the tool an interactive request is about: a running
    /// placeholder `ToolStart`, after closing any open implicit reasoning span.
    pub fn interactive_events(&mut self, request: &InteractiveRequest) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        self.close_implicit(&mut out);
        let fallback = request.kind().fallback_tool_name();
        let (name, label, input) = match request.tool_call() {
            Some(call) => {
                let identity = self.identify(call, fallback);
                (identity.name, identity.label, enrich_tool_input(call))
            }
            None => (fallback.to_string(), None, ToolInput::new()),
        };
        out.push(StreamEvent::ToolStart { name, input, label });
        out
    }

    /// Tool name a request's placeholder block was given.
    pub fn tool_name_for(&self, request: &InteractiveRequest) -> String {
        request
            .tool_call()
            .and_then(|call| call.tool_call_id.as_ref())
            .and_then(|id| self.tools.get(id))
            .map(|identity| identity.name.clone())
            .unwrap_or_else(|| request.kind().fallback_tool_name().to_string())
    }

    fn finish(&mut self, reason: StopReason, out: &mut Vec<StreamEvent>) {
        out.extend(self.splitter.finish().into_iter().map(segment_event));
        self.close_implicit(out);
        match reason {
            StopReason::EndTurn | StopReason::Cancelled | StopReason::Error => {}
            other => out.push(StreamEvent::warning(format!(
                "run stopped early: {}",
                other.as_str()
            ))),
        }
    }

    fn close_implicit(&mut self, out: &mut Vec<StreamEvent>) {
        if self.implicit_reasoning {
            self.implicit_reasoning = false;
            out.push(StreamEvent::ReasoningEnd);
        }
    }

    fn tool_events(&mut self, call: &ToolCallUpdate, out: &mut Vec<StreamEvent>) {
        let ToolIdentity { name, label } = self.identify(call, "tool");
        let input = enrich_tool_input(call);
        match call.status {
            None | Some(ToolCallStatus::Pending) | Some(ToolCallStatus::InProgress) => {
                out.push(StreamEvent::ToolStart { name, input, label });
            }
            Some(ToolCallStatus::Completed) => {
                if !input.is_empty() {
                    out.push(StreamEvent::ToolStart { name, input, label });
                }
                if let Some(content) = tool_output_text(call) {
                    out.push(StreamEvent::ToolOutput { content });
                }
                out.push(StreamEvent::ToolEnd {
                    status: ToolStatus::Completed,
                });
            }
            Some(ToolCallStatus::Failed) => {
                if let Some(content) = tool_output_text(call) {
                    out.push(StreamEvent::ToolOutput { content });
                }
                out.push(StreamEvent::ToolEnd {
                    status: ToolStatus::Error,
                });
            }
        }
    }

    /// Resolve and remember the display identity of a tool call.
    ///
    /// An explicit name always wins; otherwise a name remembered for the same
    /// call id, then the agent's `kind`, then its `title`.
    fn identify(&mut self, call: &ToolCallUpdate, fallback: &str) -> ToolIdentity {
        let known = call
            .tool_call_id
            .as_ref()
            .and_then(|id| self.tools.get(id))
            .cloned();
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let name = non_empty(&call.name)
            .or_else(|| known.as_ref().map(|k| k.name.clone()))
            .or_else(|| non_empty(&call.kind))
            .or_else(|| non_empty(&call.title))
            .unwrap_or_else(|| fallback.to_string());
        let label = non_empty(&call.title).or_else(|| known.and_then(|k| k.label));
        let identity = ToolIdentity { name, label };

        if let Some(id) = &call.tool_call_id {
            self.tools.insert(id.clone(), identity.clone());
        }
        identity
    }
}

fn segment_event(segment: TagSegment) -> StreamEvent {
    match segment {
        TagSegment::Text(content) => StreamEvent::Text { content },
        TagSegment::ReasoningStart => StreamEvent::ReasoningStart,
        TagSegment::Reasoning(content) => StreamEvent::ReasoningContent { content },
        TagSegment::ReasoningEnd => StreamEvent::ReasoningEnd,
    }
}

fn path_from_uri(uri: &str) -> String {
    uri.strip_prefix("file://").unwrap_or(uri).to_string()
}

/// Fence language for a file, from its extension first and MIME type second.
pub fn language_for(path: &str, mime_type: Option<&str>) -> String {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let by_ext = match ext.as_deref() {
        Some("rs") => Some("rust"),
        Some("py") => Some("python"),
        Some("ts") => Some("typescript"),
        Some("tsx") => Some("tsx"),
        Some("js" | "mjs" | "cjs") => Some("javascript"),
        Some("jsx") => Some("jsx"),
        Some("json") => Some("json"),
        Some("toml") => Some("toml"),
        Some("yaml" | "yml") => Some("yaml"),
        Some("md" | "markdown") => Some("markdown"),
        Some("sh" | "bash" | "zsh") => Some("bash"),
        Some("go") => Some("go"),
        Some("java") => Some("java"),
        Some("c" | "h") => Some("c"),
        Some("cc" | "cpp" | "cxx" | "hpp") => Some("cpp"),
        Some("rb") => Some("ruby"),
        Some("html" | "htm") => Some("html"),
        Some("css") => Some("css"),
        Some("sql") => Some("sql"),
        _ => None,
    };
    if let Some(lang) = by_ext {
        return lang.to_string();
    }

    mime_type
        .and_then(|mime| mime.split(';').next())
        .map(str::trim)
        .and_then(|mime| {
            mime.strip_prefix("text/x-")
                .or_else(|| mime.strip_prefix("application/x-"))
                .or_else(|| mime.strip_prefix("application/"))
                .or_else(|| mime.strip_prefix("text/"))
        })
        .filter(|lang| !lang.is_empty() && *lang != "plain")
        .map(str::to_string)
        .unwrap_or_else(|| "text".to_string())
}
