//! Configuration data model.
//!
//! Struct/enum definitions plus default values. Source discovery, env
//! overrides and validation live in sibling modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::defaults::{
    DEFAULT_COMMAND_MAX_LINES, DEFAULT_LOG_LEVEL, DEFAULT_MAX_ATTACHMENT_CHARS,
    DEFAULT_REASONING_CLOSE, DEFAULT_REASONING_OPEN, DEFAULT_SESSION_CWD, DEFAULT_SESSION_ID,
};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Tracing filter directive, e.g. `warn` or `conduit=debug`.
    pub log_level: String,
    pub stream: StreamConfig,
    pub preview: PreviewConfig,
    pub prompt: PromptConfig,
    pub approval: ApprovalConfig,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            stream: StreamConfig::default(),
            preview: PreviewConfig::default(),
            prompt: PromptConfig::default(),
            approval: ApprovalConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Inline reasoning markers recognized in assistant text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    pub reasoning_open: String,
    pub reasoning_close: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reasoning_open: DEFAULT_REASONING_OPEN.to_string(),
            reasoning_close: DEFAULT_REASONING_CLOSE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub command_max_lines: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            command_max_lines: DEFAULT_COMMAND_MAX_LINES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptConfig {
    pub max_attachment_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_attachment_chars: DEFAULT_MAX_ATTACHMENT_CHARS,
        }
    }
}

/// How permission and plan-approval requests are answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Wait for a human decision.
    #[default]
    Ask,
    /// Approve automatically.
    All,
    /// Reject automatically.
    None,
}

impl ApprovalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::All => "all",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ask" => Ok(Self::Ask),
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            other => Err(format!("unknown approval mode `{other}` (expected ask, all or none)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub mode: ApprovalMode,
}

/// Identity reported to the agent with every prompt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub session_id: String,
    pub cwd: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_string(),
            cwd: DEFAULT_SESSION_CWD.to_string(),
        }
    }
}

/// Loaded config plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    /// File the config was read from; `None` when built-in defaults were used.
    pub source: Option<std::path::PathBuf>,
}
