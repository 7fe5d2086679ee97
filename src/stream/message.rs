//! Typed session messages parsed from loosely typed agent payloads.
//!
//! `session/update` notifications carry a `sessionUpdate` discriminator and a
//! kind-specific body. Interactive requests arrive as JSON-RPC requests with
//! one of three method names. Both are parsed here into closed enums so the
//! normalizer never probes raw JSON itself.

use super::events::{PermissionOption, PlanEntry, Question};
use crate::protocol::methods;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One inbound session message, already classified.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    /// Plain assistant text, possibly with inline reasoning markers.
    AssistantText(String),
    /// Native reasoning fragment.
    AssistantReasoning(String),
    /// Embedded resource rendered as a code block.
    AssistantResource {
        uri: String,
        text: String,
        mime_type: Option<String>,
    },
    /// Link to a file location.
    AssistantLink {
        uri: String,
        line_start: Option<u32>,
        line_end: Option<u32>,
    },
    ToolCall(ToolCallUpdate),
    Plan(Vec<PlanEntry>),
    Error(String),
    Finished(StopReason),
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
    MaxTurnRequests,
    Refusal,
    Cancelled,
    /// The prompt request itself failed or the transport died.
    Error,
    #[serde(other)]
    Other,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::MaxTurnRequests => "max_turn_requests",
            Self::Refusal => "refusal",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::Other => "other",
        }
    }

    /// Parse a wire stop reason, mapping unknown strings to `Other`.
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

/// Lifecycle status as reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A tool call or an update to one. Every field is optional on updates.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallUpdate {
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default, alias = "toolName")]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<ToolCallStatus>,
    #[serde(default)]
    pub raw_input: Option<Value>,
    #[serde(default)]
    pub raw_output: Option<Value>,
    #[serde(default)]
    pub content: Vec<ToolCallContent>,
    #[serde(default)]
    pub locations: Vec<ToolLocation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    Content {
        content: ContentBlock,
    },
    Diff {
        path: String,
        #[serde(default, rename = "oldText")]
        old_text: Option<String>,
        #[serde(rename = "newText")]
        new_text: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolLocation {
    pub path: String,
    #[serde(default)]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ResourceLink {
        uri: String,
        #[serde(default, alias = "lineStart")]
        line_start: Option<u32>,
        #[serde(default, alias = "lineEnd")]
        line_end: Option<u32>,
    },
    Resource {
        resource: EmbeddedResource,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    pub uri: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
enum WireUpdate {
    AgentMessageChunk {
        content: ContentBlock,
    },
    AgentThoughtChunk {
        content: ContentBlock,
    },
    ToolCall(ToolCallUpdate),
    ToolCallUpdate(ToolCallUpdate),
    Plan {
        entries: Vec<PlanEntry>,
    },
    Error {
        message: String,
    },
    #[serde(alias = "end_turn")]
    TaskFinished {
        #[serde(default, rename = "stopReason")]
        stop_reason: Option<Value>,
    },
    #[serde(other)]
    Unsupported,
}

impl SessionMessage {
    /// Parse the `params` of a `session/update` notification.
    ///
    /// Malformed or unsupported updates yield `None` and a diagnostic.
    pub fn from_update(params: &Value) -> Option<Self> {
        let Some(update) = params.get("update") else {
            debug!("session/update without an update body");
            return None;
        };
        let wire: WireUpdate = match serde_json::from_value(update.clone()) {
            Ok(wire) => wire,
            Err(err) => {
                debug!(error = %err, "ignoring malformed session update");
                return None;
            }
        };

        match wire {
            WireUpdate::AgentMessageChunk { content } => Self::from_content(content, false),
            WireUpdate::AgentThoughtChunk { content } => Self::from_content(content, true),
            WireUpdate::ToolCall(call) | WireUpdate::ToolCallUpdate(call) => {
                Some(Self::ToolCall(call))
            }
            WireUpdate::Plan { entries } => Some(Self::Plan(entries)),
            WireUpdate::Error { message } => Some(Self::Error(message)),
            WireUpdate::TaskFinished { stop_reason } => {
                Some(Self::Finished(StopReason::from_value(stop_reason.as_ref())))
            }
            WireUpdate::Unsupported => {
                debug!(
                    kind = update.get("sessionUpdate").and_then(serde_json::Value::as_str).unwrap_or("?"),
                    "ignoring unsupported session update"
                );
                None
            }
        }
    }

    fn from_content(content: ContentBlock, reasoning: bool) -> Option<Self> {
        match content {
            ContentBlock::Text { text } if reasoning => Some(Self::AssistantReasoning(text)),
            ContentBlock::Text { text } => Some(Self::AssistantText(text)),
            ContentBlock::ResourceLink {
                uri,
                line_start,
                line_end,
            } => Some(Self::AssistantLink {
                uri,
                line_start,
                line_end,
            }),
            ContentBlock::Resource { resource } => Some(Self::AssistantResource {
                uri: resource.uri,
                text: resource.text,
                mime_type: resource.mime_type,
            }),
            ContentBlock::Unsupported => {
                debug!("ignoring unsupported content block");
                None
            }
        }
    }
}

/// Kind of interactive request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Permission,
    Question,
    PlanApproval,
}

impl RequestKind {
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            methods::REQUEST_PERMISSION => Some(Self::Permission),
            methods::ASK_QUESTION => Some(Self::Question),
            methods::EXIT_PLAN_MODE => Some(Self::PlanApproval),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Question => "question",
            Self::PlanApproval => "plan_approval",
        }
    }

    /// Tool name used for the placeholder block when the agent sends none.
    pub fn fallback_tool_name(self) -> &'static str {
        match self {
            Self::Permission => "tool",
            Self::Question => "ask_user_question",
            Self::PlanApproval => "exit_plan_mode",
        }
    }
}

/// A request that pauses progress until a human answers it.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractiveRequest {
    Permission {
        tool_call: ToolCallUpdate,
        options: Vec<PermissionOption>,
    },
    Question {
        tool_call: Option<ToolCallUpdate>,
        questions: Vec<Question>,
    },
    PlanApproval {
        tool_call: Option<ToolCallUpdate>,
        plan: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionParams {
    tool_call: ToolCallUpdate,
    #[serde(default)]
    options: Vec<PermissionOption>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionParams {
    #[serde(default)]
    tool_call: Option<ToolCallUpdate>,
    #[serde(default)]
    questions: Vec<Question>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanParams {
    #[serde(default)]
    tool_call: Option<ToolCallUpdate>,
    #[serde(default)]
    plan: String,
}

impl InteractiveRequest {
    /// Parse an inbound request. `None` when the method is not interactive
    /// or the params do not match its shape.
    pub fn parse(method: &str, params: &Value) -> Option<Self> {
        let kind = RequestKind::from_method(method)?;
        let parsed = match kind {
            RequestKind::Permission => serde_json::from_value::<PermissionParams>(params.clone())
                .map(|p| Self::Permission {
                    tool_call: p.tool_call,
                    options: p.options,
                }),
            RequestKind::Question => {
                serde_json::from_value::<QuestionParams>(params.clone()).map(|p| Self::Question {
                    tool_call: p.tool_call,
                    questions: p.questions,
                })
            }
            RequestKind::PlanApproval => {
                serde_json::from_value::<PlanParams>(params.clone()).map(|p| Self::PlanApproval {
                    tool_call: p.tool_call,
                    plan: p.plan,
                })
            }
        };
        match parsed {
            Ok(request) => Some(request),
            Err(err) => {
                debug!(method, error = %err, "malformed interactive request");
                None
            }
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Permission { .. } => RequestKind::Permission,
            Self::Question { .. } => RequestKind::Question,
            Self::PlanApproval { .. } => RequestKind::PlanApproval,
        }
    }

    pub fn tool_call(&self) -> Option<&ToolCallUpdate> {
        match self {
            Self::Permission { tool_call, .. } => Some(tool_call),
            Self::Question { tool_call, .. } | Self::PlanApproval { tool_call, .. } => {
                tool_call.as_ref()
            }
        }
    }

    pub fn options(&self) -> &[PermissionOption] {
        match self {
            Self::Permission { options, .. } => options,
            _ => &[],
        }
    }
}
