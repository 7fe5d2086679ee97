//! One in-flight prompt run.
//!
//! `ActiveRun` turns raw frames into normalized events, keeps the run's
//! assistant message current, and routes interactive requests to the
//! correlator. It never awaits anything, so the actor can drain frames in
//! arrival order while requests wait for decisions elsewhere.

use super::requests::RequestCorrelator;
use crate::document::{BlockBuilder, Message};
use crate::protocol::{self, methods, Inbound};
use crate::session::PromptTicket;
use crate::stream::{EventNormalizer, InteractiveRequest, RequestKind, SessionMessage, StopReason, StreamEvent};
use crate::transport::RawFrame;
use serde_json::Value;
use tracing::{debug, warn};

/// Whether the run keeps going after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Continue,
    Finished(StopReason),
}

/// What one frame produced.
#[derive(Debug)]
pub(crate) struct FrameStep {
    pub events: Vec<StreamEvent>,
    /// Immediate protocol replies (errors for requests we cannot serve).
    pub replies: Vec<Value>,
    pub outcome: RunOutcome,
}

impl FrameStep {
    fn events(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            replies: Vec::new(),
            outcome: RunOutcome::Continue,
        }
    }

    fn reply(reply: Value) -> Self {
        Self {
            events: Vec::new(),
            replies: vec![reply],
            outcome: RunOutcome::Continue,
        }
    }
}

pub(crate) struct ActiveRun {
    pub run_id: u64,
    normalizer: EventNormalizer,
    message: Message,
    ticket: PromptTicket,
    correlator: RequestCorrelator,
}

impl ActiveRun {
    pub fn new(
        run_id: u64,
        mut normalizer: EventNormalizer,
        ticket: PromptTicket,
        correlator: RequestCorrelator,
    ) -> Self {
        normalizer.reset();
        Self {
            run_id,
            normalizer,
            message: Message::assistant(),
            ticket,
            correlator,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Process one raw frame.
    pub fn handle_frame(&mut self, frame: &RawFrame) -> FrameStep {
        let step = match protocol::classify(frame) {
            Some(Inbound::Notification { method, params }) => self.on_notification(&method, &params),
            Some(Inbound::Request { id, method, params }) => self.on_request(id, &method, &params),
            Some(Inbound::Response { id, result, error }) => {
                self.on_response(&id, result.as_ref(), error)
            }
            None => FrameStep::events(Vec::new()),
        };
        self.apply(&step.events);
        step
    }

    /// Close out the run locally (interrupt, transport fault) and return the
    /// trailing events.
    pub fn finish(&mut self, reason: StopReason) -> Vec<StreamEvent> {
        let events = self.normalizer.finish_run(reason);
        self.apply(&events);
        BlockBuilder::finish(&mut self.message);
        events
    }

    /// Fold events produced outside `handle_frame` into the message.
    pub fn record(&mut self, events: &[StreamEvent]) {
        self.apply(events);
    }

    /// Consume the run, yielding its final message.
    pub fn into_message(mut self) -> Message {
        BlockBuilder::finish(&mut self.message);
        self.message
    }

    fn apply(&mut self, events: &[StreamEvent]) {
        for event in events {
            BlockBuilder::apply(&mut self.message, event);
        }
    }

    fn on_notification(&mut self, method: &str, params: &Value) -> FrameStep {
        if method != methods::SESSION_UPDATE {
            debug!(method, "ignoring notification");
            return FrameStep::events(Vec::new());
        }
        let Some(message) = SessionMessage::from_update(params) else {
            return FrameStep::events(Vec::new());
        };
        let mut step = FrameStep::events(self.normalizer.normalize(&message));
        if let SessionMessage::Finished(reason) = message {
            step.outcome = RunOutcome::Finished(reason);
        }
        step
    }

    fn on_request(&mut self, id: Value, method: &str, params: &Value) -> FrameStep {
        let Some(kind) = RequestKind::from_method(method) else {
            warn!(method, "agent sent unsupported request");
            return FrameStep::reply(protocol::error_response(
                id,
                protocol::METHOD_NOT_FOUND,
                &format!("unsupported method `{method}`"),
            ));
        };
        let Some(numeric) = protocol::numeric_id(&id) else {
            warn!(kind = kind.as_str(), "interactive request with non-numeric id");
            return FrameStep::reply(protocol::error_response(
                id,
                protocol::INVALID_PARAMS,
                "request id must be numeric",
            ));
        };
        let Some(request) = InteractiveRequest::parse(method, params) else {
            warn!(request_id = numeric, kind = kind.as_str(), "malformed interactive request");
            return FrameStep::reply(protocol::error_response(
                id,
                protocol::INVALID_PARAMS,
                &format!("malformed {} request", kind.as_str()),
            ));
        };

        let mut events = self.normalizer.interactive_events(&request);
        let tool_name = self.normalizer.tool_name_for(&request);
        events.push(
            self.correlator
                .intercept(self.run_id, numeric, &request, &tool_name),
        );
        FrameStep::events(events)
    }

    fn on_response(&mut self, id: &Value, result: Option<&Value>, error: Option<protocol::RpcError>) -> FrameStep {
        if !self.ticket.matches(id) {
            debug!(%id, "ignoring response to another request");
            return FrameStep::events(Vec::new());
        }
        if let Some(error) = error {
            warn!(code = error.code, message = %error.message, "prompt request failed");
            let mut events = vec![StreamEvent::error(format!(
                "prompt failed ({}): {}",
                error.code, error.message
            ))];
            events.extend(self.normalizer.finish_run(StopReason::Error));
            return FrameStep {
                events,
                replies: Vec::new(),
                outcome: RunOutcome::Finished(StopReason::Error),
            };
        }
        let reason = StopReason::from_value(result.and_then(|r| r.get("stopReason")));
        FrameStep {
            events: self.normalizer.finish_run(reason),
            replies: Vec::new(),
            outcome: RunOutcome::Finished(reason),
        }
    }
}
