//! Terminal rendering of runtime events.
//!
//! Streaming chunks are not printed as they arrive. Interactive requests,
//! warnings and errors show up live; the assistant document is drawn once
//! per run from the final [`Message`], with tool blocks summarized through
//! [`crate::preview`].

use crate::document::{Block, Message, ToolBlock};
use crate::preview::{extract_with_limit, DiffLineKind, ToolPreview};
use crate::runtime::{RuntimeEvent, RuntimeEventEnvelope};
use crate::stream::{PlanEntryStatus, StreamEvent, ToolStatus};
use crate::textutil::single_line_preview;
use crossterm::style::Stylize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Heading,
    Muted,
    Accent,
    Added,
    Removed,
    Warning,
    Error,
}

/// Formats runtime events as terminal lines.
#[derive(Debug, Clone, Copy)]
pub struct TerminalRenderer {
    /// Whether ANSI color/style output is enabled.
    color: bool,
    command_max_lines: usize,
}

impl TerminalRenderer {
    pub fn new(color: bool, command_max_lines: usize) -> Self {
        Self {
            color,
            command_max_lines,
        }
    }

    /// Print one envelope to stderr.
    pub fn render(&self, envelope: &RuntimeEventEnvelope) {
        for line in self.lines_for(envelope) {
            eprintln!("{line}");
        }
    }

    /// Lines an envelope renders to. Empty for events drawn later as part of
    /// the finished document.
    pub fn lines_for(&self, envelope: &RuntimeEventEnvelope) -> Vec<String> {
        match &envelope.event {
            RuntimeEvent::RunStarted { run_id } => {
                vec![self.paint(format!("── run #{run_id} ──"), Tone::Heading)]
            }
            RuntimeEvent::Stream { event, .. } => self.live_event(event),
            RuntimeEvent::RunFinished {
                run_id,
                stop_reason,
                message,
            } => {
                let mut lines = self.message_lines(message);
                lines.push(self.paint(
                    format!("── run #{run_id} finished: {} ──", stop_reason.as_str()),
                    Tone::Muted,
                ));
                lines
            }
            RuntimeEvent::RunFailed {
                run_id,
                error,
                message,
            } => {
                let mut lines = self.message_lines(message);
                lines.push(self.paint(format!("── run #{run_id} failed: {error} ──"), Tone::Error));
                lines
            }
            RuntimeEvent::Notice { message } => vec![self.paint(message.clone(), Tone::Muted)],
            RuntimeEvent::RuntimeStopped => Vec::new(),
        }
    }

    fn live_event(&self, event: &StreamEvent) -> Vec<String> {
        match event {
            StreamEvent::ConfirmationNeeded {
                request_id,
                tool_name,
                description,
                options,
            } => {
                let mut lines = vec![self.paint(
                    format!("? [{request_id}] {tool_name} wants permission: {description}"),
                    Tone::Accent,
                )];
                for option in options {
                    let label = if option.name.is_empty() {
                        option.option_id.as_str()
                    } else {
                        option.name.as_str()
                    };
                    lines.push(format!("    {} ({})", label, option.option_id));
                }
                lines
            }
            StreamEvent::QuestionNeeded {
                request_id,
                questions,
            } => {
                let mut lines = vec![self.paint(
                    format!("? [{request_id}] agent has {} question(s)", questions.len()),
                    Tone::Accent,
                )];
                for question in questions {
                    lines.push(format!("    {}", question.question));
                    for option in &question.options {
                        lines.push(self.paint(format!("      - {}", option.label), Tone::Muted));
                    }
                }
                lines
            }
            StreamEvent::PlanApprovalNeeded { request_id, plan } => {
                let mut lines = vec![self.paint(
                    format!("? [{request_id}] approve plan?"),
                    Tone::Accent,
                )];
                lines.extend(plan.lines().map(|line| format!("    {line}")));
                lines
            }
            StreamEvent::Warning { message } => {
                vec![self.paint(format!("warning: {message}"), Tone::Warning)]
            }
            StreamEvent::Error { message } => {
                vec![self.paint(format!("error: {message}"), Tone::Error)]
            }
            _ => Vec::new(),
        }
    }

    /// Render a finished message block by block.
    pub fn message_lines(&self, message: &Message) -> Vec<String> {
        let mut lines = Vec::new();
        for block in &message.blocks {
            match block {
                Block::Text { content } => lines.extend(content.lines().map(str::to_string)),
                Block::Code {
                    lang,
                    filename,
                    content,
                } => {
                    let header = match filename {
                        Some(name) => format!("```{lang} {name}"),
                        None => format!("```{lang}"),
                    };
                    lines.push(self.paint(header, Tone::Muted));
                    lines.extend(content.lines().map(str::to_string));
                    lines.push(self.paint("```", Tone::Muted));
                }
                Block::Tool(tool) => lines.extend(self.tool_lines(tool)),
                Block::Reasoning { content, collapsed } => {
                    if *collapsed {
                        lines.push(self.paint(
                            format!("thinking: {}", single_line_preview(content, 72)),
                            Tone::Muted,
                        ));
                    } else {
                        lines.extend(
                            content
                                .lines()
                                .map(|line| self.paint(format!("│ {line}"), Tone::Muted)),
                        );
                    }
                }
                Block::FileRef {
                    path,
                    line_start,
                    line_end,
                } => {
                    let range = match (line_start, line_end) {
                        (Some(start), Some(end)) if end != start => format!(":{start}-{end}"),
                        (Some(start), _) => format!(":{start}"),
                        _ => String::new(),
                    };
                    lines.push(self.paint(format!("@ {path}{range}"), Tone::Accent));
                }
                Block::Plan { entries } => {
                    lines.push(self.paint("plan", Tone::Heading));
                    for entry in entries {
                        let mark = match entry.status {
                            PlanEntryStatus::Completed => "[x]",
                            PlanEntryStatus::InProgress => "[~]",
                            PlanEntryStatus::Pending => "[ ]",
                        };
                        lines.push(format!("  {mark} {}", entry.content));
                    }
                }
                Block::Error { message } => {
                    lines.push(self.paint(format!("error: {message}"), Tone::Error));
                }
                Block::Warning { message } => {
                    lines.push(self.paint(format!("warning: {message}"), Tone::Warning));
                }
            }
        }
        lines
    }

    /// Header line plus preview rows for one tool block.
    pub fn tool_lines(&self, tool: &ToolBlock) -> Vec<String> {
        let status = match tool.status {
            ToolStatus::Running => self.paint("running", Tone::Warning),
            ToolStatus::Completed => self.paint("done", Tone::Added),
            ToolStatus::Error => self.paint("failed", Tone::Error),
        };
        let title = match &tool.label {
            Some(label) if label != &tool.name => format!("{} ({label})", tool.name),
            _ => tool.name.clone(),
        };
        let mut lines = vec![format!("▶ {} [{status}]", self.paint(title, Tone::Heading))];

        match extract_with_limit(tool, self.command_max_lines) {
            Some(ToolPreview::Diff(diff)) => {
                lines.push(self.paint(
                    format!("  {} (+{} -{})", diff.file_name, diff.added, diff.removed),
                    Tone::Muted,
                ));
                for line in diff.lines {
                    let (prefix, tone) = match line.kind {
                        DiffLineKind::Add => ("+", Tone::Added),
                        DiffLineKind::Del => ("-", Tone::Removed),
                        DiffLineKind::Ctx => (" ", Tone::Muted),
                        DiffLineKind::Meta => ("", Tone::Accent),
                    };
                    let gutter = line
                        .line_no
                        .map(|n| format!("{n:>4} "))
                        .unwrap_or_else(|| "     ".to_string());
                    lines.push(format!("  {gutter}{}", self.paint(format!("{prefix}{}", line.text), tone)));
                }
            }
            Some(ToolPreview::Command(command)) => {
                if let Some(cmd) = command.command {
                    lines.push(self.paint(format!("  $ {cmd}"), Tone::Accent));
                }
                lines.extend(command.lines.into_iter().map(|line| format!("  {line}")));
            }
            None => {}
        }
        lines
    }

    fn paint(&self, text: impl Into<String>, tone: Tone) -> String {
        let text = text.into();
        if !self.color {
            return text;
        }
        let styled = match tone {
            Tone::Heading => text.bold(),
            Tone::Muted => text.dark_grey(),
            Tone::Accent => text.cyan(),
            Tone::Added => text.green(),
            Tone::Removed => text.red(),
            Tone::Warning => text.yellow(),
            Tone::Error => text.red().bold(),
        };
        styled.to_string()
    }
}
