//! Streaming runtime actor and schema facade.
//!
//! Runtime command/event types live in `schema`, interactive request
//! bookkeeping in `requests`, and per-run frame handling in `run`. This module
//! hosts the actor that ties them to an agent session and a frame queue.

use crate::config::Config;
use crate::document::Conversation;
use crate::error::TransportError;
use crate::prompt::build_prompt;
use crate::session::{AgentSession, PromptTicket};
use crate::stream::{EventNormalizer, StopReason, StreamEvent};
use crate::textutil::truncate_with_suffix_by_chars;
use crate::transport::{FrameQueue, RawFrame, Transport};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

mod requests;
mod run;
mod schema;

pub use requests::RequestCorrelator;
use run::{ActiveRun, RunOutcome};
pub use schema::*;

/// Handle for sending commands to a spawned runtime actor and deciding on
/// interactive requests.
#[derive(Clone)]
pub struct RuntimeHandle {
    pub commands: mpsc::Sender<RuntimeCommand>,
    correlator: RequestCorrelator,
}

impl RuntimeHandle {
    /// Send one command to the runtime actor.
    pub async fn send(&self, command: RuntimeCommand) -> Result<(), String> {
        self.commands
            .send(command)
            .await
            .map_err(|_| "runtime command channel closed".to_string())
    }

    /// Approve a permission request. `option_id` picks a specific option;
    /// otherwise the first allow option is used.
    pub fn approve_permission(&self, request_id: u64, option_id: Option<String>) -> bool {
        self.correlator
            .resolve(request_id, Decision::Allow { option_id })
    }

    /// Reject any interactive request.
    pub fn reject(&self, request_id: u64) -> bool {
        self.correlator.resolve(request_id, Decision::Reject)
    }

    pub fn answer_question(&self, request_id: u64, answers: BTreeMap<String, String>) -> bool {
        self.correlator
            .resolve(request_id, Decision::Answers(answers))
    }

    pub fn decide_plan(&self, request_id: u64, approved: bool) -> bool {
        self.correlator
            .resolve(request_id, Decision::Plan { approved })
    }

    /// Withdraw a request without a decision.
    pub fn cancel_request(&self, request_id: u64) -> bool {
        self.correlator.resolve(request_id, Decision::Cancel)
    }

    /// Ids of interactive requests still waiting for a decision.
    pub fn pending_requests(&self) -> Vec<u64> {
        self.correlator.pending_ids()
    }
}

/// Event stream receiver returned by [`spawn_runtime`].
pub type RuntimeEventStream = mpsc::UnboundedReceiver<RuntimeEventEnvelope>;

/// Bootstrap inputs for the runtime actor.
pub struct RuntimeSpawnConfig {
    pub config: Config,
    pub session: Arc<dyn AgentSession>,
    /// Outbound path for responses to agent requests.
    pub transport: Arc<dyn Transport>,
    /// Inbound frames. The actor is the only consumer.
    pub frames: FrameQueue,
}

/// Spawn the runtime actor.
///
/// The actor connects the session, then serves commands. While a run is
/// active it drains the frame queue in arrival order; frames are never read
/// while idle.
pub fn spawn_runtime(spawn: RuntimeSpawnConfig) -> (RuntimeHandle, RuntimeEventStream) {
    let (command_tx, mut command_rx) = mpsc::channel::<RuntimeCommand>(64);
    let (event_tx, event_rx) = mpsc::unbounded_channel::<RuntimeEventEnvelope>();
    let correlator = RequestCorrelator::new(
        Arc::clone(&spawn.transport),
        ApprovalPolicy::from(spawn.config.approval.mode),
    );

    let mut actor = RuntimeActor {
        normalizer: EventNormalizer::with_markers(
            spawn.config.stream.reasoning_open.clone(),
            spawn.config.stream.reasoning_close.clone(),
        ),
        session: spawn.session,
        transport: spawn.transport,
        correlator: correlator.clone(),
        conversation: Conversation::default(),
        active: None,
        next_run_id: 1,
        event_tx,
        seq: 0,
    };
    let frames = spawn.frames;

    tokio::spawn(async move {
        if let Err(err) = actor.session.connect().await {
            warn!(error = %err, "agent session failed to connect");
            actor.emit(RuntimeEvent::Notice {
                message: format!("agent session failed to connect: {err}"),
            });
        }

        loop {
            tokio::select! {
                biased;
                command = command_rx.recv() => {
                    let Some(command) = command else {
                        actor.shutdown().await;
                        break;
                    };
                    if actor.handle_command(command).await {
                        break;
                    }
                }
                frame = frames.next(), if actor.active.is_some() => {
                    actor.handle_frame(frame).await;
                }
            }
        }
        actor.emit(RuntimeEvent::RuntimeStopped);
    });

    (
        RuntimeHandle {
            commands: command_tx,
            correlator,
        },
        event_rx,
    )
}

struct RuntimeActor {
    normalizer: EventNormalizer,
    session: Arc<dyn AgentSession>,
    transport: Arc<dyn Transport>,
    correlator: RequestCorrelator,
    conversation: Conversation,
    active: Option<ActiveRun>,
    next_run_id: u64,
    event_tx: mpsc::UnboundedSender<RuntimeEventEnvelope>,
    seq: u64,
}

impl RuntimeActor {
    fn emit(&mut self, event: RuntimeEvent) {
        let _ = self.event_tx.send(RuntimeEventEnvelope::new(self.seq, event));
        self.seq = self.seq.saturating_add(1);
    }

    fn emit_stream(&mut self, run_id: u64, events: Vec<StreamEvent>) {
        for event in events {
            self.emit(RuntimeEvent::Stream { run_id, event });
        }
    }

    /// Returns true when the actor should stop.
    async fn handle_command(&mut self, command: RuntimeCommand) -> bool {
        match command {
            RuntimeCommand::SubmitPrompt { prompt, context } => {
                if self.active.is_some() {
                    self.emit(RuntimeEvent::Notice {
                        message: "a run is already active; interrupt it first".to_string(),
                    });
                    return false;
                }
                let run_id = self.next_run_id;
                self.next_run_id = self.next_run_id.saturating_add(1);
                info!(
                    run_id,
                    prompt = %truncate_with_suffix_by_chars(&prompt, 80, "..."),
                    "starting run"
                );
                self.conversation.push_user(prompt.clone());
                self.emit(RuntimeEvent::RunStarted { run_id });

                let text = build_prompt(&prompt, &context);
                match self.session.send_prompt(&text).await {
                    Ok(ticket) => {
                        self.active = Some(ActiveRun::new(
                            run_id,
                            self.normalizer.clone(),
                            ticket,
                            self.correlator.clone(),
                        ));
                    }
                    Err(err) => {
                        warn!(run_id, error = %err, "prompt submission failed");
                        let mut run = ActiveRun::new(
                            run_id,
                            self.normalizer.clone(),
                            PromptTicket { request_id: None },
                            self.correlator.clone(),
                        );
                        let event = StreamEvent::error(format!("prompt submission failed: {err}"));
                        run.record(std::slice::from_ref(&event));
                        self.emit_stream(run_id, vec![event]);
                        let message = run.into_message();
                        self.conversation.push_assistant(message.clone());
                        self.emit(RuntimeEvent::RunFailed {
                            run_id,
                            error: err.to_string(),
                            message,
                        });
                    }
                }
            }
            RuntimeCommand::Interrupt => {
                if self.active.is_none() {
                    self.emit(RuntimeEvent::Notice {
                        message: "no active run to interrupt".to_string(),
                    });
                    return false;
                }
                self.interrupt_active().await;
            }
            RuntimeCommand::SetApprovalPolicy { policy } => {
                let resolved = self.correlator.set_policy(policy);
                info!(policy = policy.label(), resolved, "approval policy updated");
                self.emit(RuntimeEvent::Notice {
                    message: format!(
                        "approval policy set to {}; {resolved} pending request(s) resolved",
                        policy.label()
                    ),
                });
            }
            RuntimeCommand::Shutdown => {
                self.shutdown().await;
                return true;
            }
        }
        false
    }

    async fn interrupt_active(&mut self) {
        let Some(mut run) = self.active.take() else {
            return;
        };
        if let Err(err) = self.session.interrupt().await {
            warn!(run_id = run.run_id, error = %err, "failed to send interrupt");
        }
        self.correlator.cancel_run(run.run_id);
        let events = run.finish(StopReason::Cancelled);
        let run_id = run.run_id;
        self.emit_stream(run_id, events);
        self.complete(run, StopReason::Cancelled);
    }

    async fn shutdown(&mut self) {
        if self.active.is_some() {
            self.interrupt_active().await;
        }
        self.correlator.cancel_all();
        debug!(messages = self.conversation.messages.len(), "runtime shutting down");
    }

    async fn handle_frame(&mut self, frame: Result<RawFrame, TransportError>) {
        let Some(run) = self.active.as_mut() else {
            return;
        };
        let run_id = run.run_id;
        match frame {
            Ok(frame) => {
                let step = run.handle_frame(&frame);
                for reply in step.replies {
                    if let Err(err) = self.transport.send(reply).await {
                        warn!(run_id, error = %err, "failed to send protocol reply");
                    }
                }
                self.emit_stream(run_id, step.events);
                if let RunOutcome::Finished(reason) = step.outcome {
                    if let Some(run) = self.active.take() {
                        self.complete(run, reason);
                    }
                }
            }
            Err(fault) => {
                error!(run_id, error = %fault, "transport failed during run");
                let error = StreamEvent::error(format!("transport failed: {fault}"));
                run.record(std::slice::from_ref(&error));
                let mut events = vec![error];
                events.extend(run.finish(StopReason::Error));
                self.emit_stream(run_id, events);
                self.correlator.cancel_run(run_id);
                if let Some(run) = self.active.take() {
                    let message = run.into_message();
                    self.conversation.push_assistant(message.clone());
                    self.emit(RuntimeEvent::RunFailed {
                        run_id,
                        error: fault.to_string(),
                        message,
                    });
                }
            }
        }
    }

    /// Retire a finished run. Requests it left pending are cancelled.
    fn complete(&mut self, run: ActiveRun, stop_reason: StopReason) {
        let run_id = run.run_id;
        let leftover = self.correlator.cancel_run(run_id);
        if leftover > 0 {
            debug!(run_id, leftover, "run ended with pending requests");
        }
        let message = run.into_message();
        self.conversation.push_assistant(message.clone());
        info!(run_id, stop_reason = stop_reason.as_str(), "run finished");
        self.emit(RuntimeEvent::RunFinished {
            run_id,
            stop_reason,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Block;
    use crate::prompt::PromptContext;
    use crate::session::RpcAgentSession;
    use crate::testsupport::{permission_request, prompt_response, text_chunk, thought_chunk};
    use crate::transport::{MemoryChannel, RecordingTransport};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::time::timeout;

    struct Harness {
        handle: RuntimeHandle,
        events: RuntimeEventStream,
        channel: MemoryChannel,
        sent: mpsc::UnboundedReceiver<Value>,
    }

    fn harness(config: Config) -> Harness {
        let channel = MemoryChannel::new();
        let frames = FrameQueue::attach(&channel);
        let (transport, sent) = RecordingTransport::new();
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let session = Arc::new(RpcAgentSession::new(Arc::clone(&transport), "s1", "/work"));
        let (handle, events) = spawn_runtime(RuntimeSpawnConfig {
            config,
            session,
            transport,
            frames,
        });
        Harness {
            handle,
            events,
            channel,
            sent,
        }
    }

    async fn recv_event(rx: &mut RuntimeEventStream) -> RuntimeEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event timeout")
            .expect("event channel closed")
            .event
    }

    async fn recv_sent(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("send timeout")
            .expect("transport dropped")
    }

    async fn submit(h: &mut Harness, prompt: &str) {
        h.handle
            .send(RuntimeCommand::SubmitPrompt {
                prompt: prompt.to_string(),
                context: PromptContext::default(),
            })
            .await
            .expect("send submit");
        assert_eq!(recv_sent(&mut h.sent).await["method"], json!("initialize"));
        assert_eq!(recv_sent(&mut h.sent).await["method"], json!("session/prompt"));
        assert!(matches!(
            recv_event(&mut h.events).await,
            RuntimeEvent::RunStarted { run_id: 1 }
        ));
    }

    async fn until_finished(rx: &mut RuntimeEventStream) -> (Vec<StreamEvent>, RuntimeEvent) {
        let mut stream = Vec::new();
        loop {
            match recv_event(rx).await {
                RuntimeEvent::Stream { event, .. } => stream.push(event),
                done @ (RuntimeEvent::RunFinished { .. } | RuntimeEvent::RunFailed { .. }) => {
                    return (stream, done)
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn prompt_run_streams_and_finishes_on_response() {
        let mut h = harness(Config::default());
        submit(&mut h, "hi").await;

        h.channel.deliver(vec![
            thought_chunk("thinking"),
            text_chunk("hello "),
            text_chunk("world"),
            prompt_response(2, "end_turn"),
        ]);
        let (stream, done) = until_finished(&mut h.events).await;
        assert_eq!(stream[0], StreamEvent::ReasoningStart);
        assert!(stream.contains(&StreamEvent::ReasoningEnd));

        let RuntimeEvent::RunFinished {
            stop_reason,
            message,
            ..
        } = done
        else {
            panic!("expected RunFinished, got {done:?}");
        };
        assert_eq!(stop_reason, StopReason::EndTurn);
        assert!(!message.streaming);
        assert_eq!(
            message.blocks.last(),
            Some(&Block::Text {
                content: "hello world".to_string()
            })
        );
    }

    #[tokio::test]
    async fn permission_decision_is_sent_while_run_continues() {
        let mut h = harness(Config::default());
        submit(&mut h, "list").await;

        h.channel.deliver_one(permission_request(7, "call_1", "Run ls"));
        loop {
            if let RuntimeEvent::Stream {
                event: StreamEvent::ConfirmationNeeded { request_id, .. },
                ..
            } = recv_event(&mut h.events).await
            {
                assert_eq!(request_id, 7);
                break;
            }
        }
        assert_eq!(h.handle.pending_requests(), vec![7]);

        // The run keeps draining frames while the request waits.
        h.channel.deliver_one(text_chunk("still here"));
        assert!(matches!(
            recv_event(&mut h.events).await,
            RuntimeEvent::Stream {
                event: StreamEvent::Text { .. },
                ..
            }
        ));

        assert!(h.handle.reject(7));
        assert!(!h.handle.reject(7));
        let response = recv_sent(&mut h.sent).await;
        assert_eq!(response["id"], json!(7));
        assert_eq!(
            response["result"]["outcome"]["optionId"],
            json!("reject-once")
        );

        h.channel.deliver_one(prompt_response(2, "end_turn"));
        let (_, done) = until_finished(&mut h.events).await;
        assert!(matches!(done, RuntimeEvent::RunFinished { .. }));
    }

    #[tokio::test]
    async fn interrupt_cancels_pending_requests() {
        let mut h = harness(Config::default());
        submit(&mut h, "slow").await;
        h.channel.deliver_one(permission_request(3, "call_1", "Write file"));
        loop {
            if let RuntimeEvent::Stream {
                event: StreamEvent::ConfirmationNeeded { .. },
                ..
            } = recv_event(&mut h.events).await
            {
                break;
            }
        }

        h.handle
            .send(RuntimeCommand::Interrupt)
            .await
            .expect("send interrupt");
        let (_, done) = until_finished(&mut h.events).await;
        let RuntimeEvent::RunFinished {
            stop_reason,
            message,
            ..
        } = done
        else {
            panic!("expected RunFinished");
        };
        assert_eq!(stop_reason, StopReason::Cancelled);
        assert!(!message.streaming);
        assert_eq!(message.tool_blocks().count(), 1);

        let mut sent = vec![recv_sent(&mut h.sent).await, recv_sent(&mut h.sent).await];
        sent.sort_by_key(|v| v.get("id").is_some());
        assert_eq!(sent[0]["method"], json!("session/cancel"));
        assert_eq!(sent[1]["id"], json!(3));
        assert_eq!(sent[1]["result"], json!({"outcome": {"outcome": "cancelled"}}));
        assert!(h.handle.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn second_prompt_while_busy_is_refused() {
        let mut h = harness(Config::default());
        submit(&mut h, "first").await;
        h.handle
            .send(RuntimeCommand::SubmitPrompt {
                prompt: "second".to_string(),
                context: PromptContext::default(),
            })
            .await
            .expect("send submit");
        assert!(matches!(
            recv_event(&mut h.events).await,
            RuntimeEvent::Notice { .. }
        ));
    }

    #[tokio::test]
    async fn transport_fault_fails_the_run() {
        let mut h = harness(Config::default());
        submit(&mut h, "hi").await;
        h.channel.deliver_one(text_chunk("partial"));
        h.channel.fail("socket reset");
        let (stream, done) = until_finished(&mut h.events).await;
        assert!(stream
            .iter()
            .any(|event| matches!(event, StreamEvent::Error { message } if message.contains("socket reset"))));
        assert!(matches!(done, RuntimeEvent::RunFailed { run_id: 1, .. }));
    }

    #[tokio::test]
    async fn auto_approve_policy_answers_without_prompting() {
        let mut config = Config::default();
        config.approval.mode = crate::config::ApprovalMode::All;
        let mut h = harness(config);
        submit(&mut h, "go").await;
        h.channel.deliver_one(permission_request(4, "call_1", "Run ls"));
        let response = recv_sent(&mut h.sent).await;
        assert_eq!(response["id"], json!(4));
        assert_eq!(response["result"]["outcome"]["optionId"], json!("allow-once"));
        assert!(h.handle.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_the_actor() {
        let mut h = harness(Config::default());
        h.handle
            .send(RuntimeCommand::Shutdown)
            .await
            .expect("send shutdown");
        loop {
            if recv_event(&mut h.events).await == RuntimeEvent::RuntimeStopped {
                break;
            }
        }
    }
}
