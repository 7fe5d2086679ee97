//! Conversation document built incrementally from stream events.
//!
//! A [`Message`] is an ordered list of typed [`Block`]s. Only the last block
//! may be open for appending. [`BlockBuilder::apply`] is the single dispatch
//! point that picks the merge rule for each event.

use crate::stream::{PlanEntry, StreamEvent, ToolInput, ToolStatus};
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text {
        content: String,
    },
    Code {
        lang: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        content: String,
    },
    Tool(ToolBlock),
    Reasoning {
        content: String,
        collapsed: bool,
    },
    FileRef {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_start: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line_end: Option<u32>,
    },
    Plan {
        entries: Vec<PlanEntry>,
    },
    Error {
        message: String,
    },
    Warning {
        message: String,
    },
}

/// One tool invocation as the document sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolBlock {
    pub name: String,
    #[serde(default)]
    pub input: ToolInput,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ToolBlock {
    pub fn new(name: impl Into<String>, input: ToolInput, label: Option<String>) -> Self {
        Self {
            name: name.into(),
            input,
            output: String::new(),
            status: ToolStatus::Running,
            label,
        }
    }

    /// Union `input` into this block's input. New keys win.
    fn merge_input(&mut self, input: &ToolInput, label: Option<&String>) {
        for (key, value) in input {
            self.input.insert(key.clone(), value.clone());
        }
        if let Some(label) = label {
            self.label = Some(label.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub blocks: Vec<Block>,
    pub streaming: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            blocks: vec![Block::Text {
                content: text.into(),
            }],
            streaming: false,
        }
    }

    /// Empty assistant message open for streaming.
    pub fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            blocks: Vec::new(),
            streaming: true,
        }
    }

    pub fn tool_blocks(&self) -> impl Iterator<Item = &ToolBlock> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Tool(tool) => Some(tool),
            _ => None,
        })
    }
}

/// Ordered list of messages exchanged in one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Append a finished assistant message, closing it first if it is still
    /// streaming.
    pub fn push_assistant(&mut self, mut message: Message) {
        if message.streaming {
            BlockBuilder::finish(&mut message);
        }
        self.messages.push(message);
    }
}

/// Reducer folding stream events into a message.
pub struct BlockBuilder;

impl BlockBuilder {
    pub fn apply(message: &mut Message, event: &StreamEvent) {
        let blocks = &mut message.blocks;
        match event {
            StreamEvent::Text { content } => match blocks.last_mut() {
                Some(Block::Text { content: open }) => open.push_str(content),
                _ => blocks.push(Block::Text {
                    content: content.clone(),
                }),
            },
            StreamEvent::CodeStart { lang, filename } => blocks.push(Block::Code {
                lang: lang.clone(),
                filename: filename.clone(),
                content: String::new(),
            }),
            StreamEvent::CodeContent { content } => match blocks.last_mut() {
                Some(Block::Code { content: open, .. }) => open.push_str(content),
                _ => blocks.push(Block::Code {
                    lang: "text".to_string(),
                    filename: None,
                    content: content.clone(),
                }),
            },
            StreamEvent::CodeEnd => {}
            StreamEvent::ToolStart { name, input, label } => match blocks.last_mut() {
                Some(Block::Tool(tool)) if tool.name == *name && tool.status == ToolStatus::Running => {
                    tool.merge_input(input, label.as_ref());
                }
                _ => blocks.push(Block::Tool(ToolBlock::new(
                    name.clone(),
                    input.clone(),
                    label.clone(),
                ))),
            },
            StreamEvent::ToolOutput { content } => match blocks.last_mut() {
                Some(Block::Tool(tool)) => tool.output.push_str(content),
                _ => trace!("tool output without an open tool block"),
            },
            StreamEvent::ToolEnd { status } => match blocks.last_mut() {
                Some(Block::Tool(tool)) => tool.status = *status,
                _ => trace!("tool end without an open tool block"),
            },
            StreamEvent::ReasoningStart => blocks.push(Block::Reasoning {
                content: String::new(),
                collapsed: false,
            }),
            StreamEvent::ReasoningContent { content } => match blocks.last_mut() {
                Some(Block::Reasoning {
                    content: open,
                    collapsed: false,
                }) => open.push_str(content),
                _ => blocks.push(Block::Reasoning {
                    content: content.clone(),
                    collapsed: false,
                }),
            },
            StreamEvent::ReasoningEnd => {
                if let Some(Block::Reasoning { collapsed, .. }) = blocks.last_mut() {
                    *collapsed = true;
                }
            }
            StreamEvent::FileRef {
                path,
                line_start,
                line_end,
            } => blocks.push(Block::FileRef {
                path: path.clone(),
                line_start: *line_start,
                line_end: *line_end,
            }),
            StreamEvent::Plan { entries } => {
                let existing = blocks.iter_mut().find_map(|block| match block {
                    Block::Plan { entries } => Some(entries),
                    _ => None,
                });
                match existing {
                    Some(current) => *current = entries.clone(),
                    None => blocks.push(Block::Plan {
                        entries: entries.clone(),
                    }),
                }
            }
            StreamEvent::Error { message } => blocks.push(Block::Error {
                message: message.clone(),
            }),
            StreamEvent::Warning { message } => blocks.push(Block::Warning {
                message: message.clone(),
            }),
            // Interactive requests are answered out of band; their tool
            // placeholder already arrived as a ToolStart.
            StreamEvent::ConfirmationNeeded { .. }
            | StreamEvent::QuestionNeeded { .. }
            | StreamEvent::PlanApprovalNeeded { .. } => {}
        }
    }

    /// Freeze a message at run end: stop streaming and collapse reasoning.
    pub fn finish(message: &mut Message) {
        message.streaming = false;
        for block in &mut message.blocks {
            if let Block::Reasoning { collapsed, .. } = block {
                *collapsed = true;
            }
        }
    }
}
