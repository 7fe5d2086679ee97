//! Runtime command/event schema.
//!
//! The control plane (`RuntimeCommand`) drives the run loop actor; the data
//! plane (`RuntimeEventEnvelope`) carries normalized stream events and run
//! lifecycle milestones to the presentation layer.

use crate::config::ApprovalMode;
use crate::document::Message;
use crate::prompt::PromptContext;
use crate::stream::{StopReason, StreamEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Control-plane commands for the run loop actor.
///
/// Human decisions on interactive requests do not go through this channel;
/// they resolve directly on the correlator so they work while the actor is
/// parked on the frame queue.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCommand {
    SubmitPrompt {
        prompt: String,
        context: PromptContext,
    },
    /// Stop the active run and cancel its pending requests.
    Interrupt,
    SetApprovalPolicy {
        policy: ApprovalPolicy,
    },
    Shutdown,
}

/// How permission and plan-approval requests are answered.
///
/// Questions always wait for a human regardless of policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ApprovalPolicy {
    Ask,
    All,
    None,
    Until {
        /// Absolute unix timestamp in milliseconds when auto-approve expires.
        expires_at_unix_ms: u64,
    },
}

impl ApprovalPolicy {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::All => "all",
            Self::None => "none",
            Self::Until { .. } => "until",
        }
    }
}

impl From<ApprovalMode> for ApprovalPolicy {
    fn from(mode: ApprovalMode) -> Self {
        match mode {
            ApprovalMode::Ask => Self::Ask,
            ApprovalMode::All => Self::All,
            ApprovalMode::None => Self::None,
        }
    }
}

/// A human (or policy) decision on one interactive request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Approve a permission request, optionally naming the chosen option.
    Allow { option_id: Option<String> },
    /// Answers to a question request, keyed by question text.
    Answers(BTreeMap<String, String>),
    /// Approve or reject a plan.
    Plan { approved: bool },
    /// Explicit rejection. Valid for every request kind.
    Reject,
    /// No decision was made (interrupt, teardown). Valid for every kind.
    Cancel,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow { .. } => "allow",
            Self::Answers(_) => "answers",
            Self::Plan { approved: true } => "plan_approved",
            Self::Plan { approved: false } => "plan_rejected",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
        }
    }
}

/// Monotonic envelope for runtime events.
///
/// `seq` is assigned by the actor; `ts_unix_ms` is wall-clock capture time
/// used for diagnostics and playback.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuntimeEventEnvelope {
    pub seq: u64,
    pub ts_unix_ms: u64,
    pub event: RuntimeEvent,
}

impl RuntimeEventEnvelope {
    pub fn new(seq: u64, event: RuntimeEvent) -> Self {
        Self {
            seq,
            ts_unix_ms: now_unix_millis(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    RunStarted {
        run_id: u64,
    },
    /// One normalized event produced during a run.
    Stream {
        run_id: u64,
        event: StreamEvent,
    },
    RunFinished {
        run_id: u64,
        stop_reason: StopReason,
        /// Final state of the run's assistant message.
        message: Message,
    },
    /// The run ended on a transport fault.
    RunFailed {
        run_id: u64,
        error: String,
        message: Message,
    },
    /// Non-fatal runtime notice not tied to a stream event.
    Notice {
        message: String,
    },
    RuntimeStopped,
}

pub(crate) fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
