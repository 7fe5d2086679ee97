//! End-to-end pipeline tests: raw frames in, document and responses out.

use conduit::config::Config;
use conduit::document::Block;
use conduit::preview::{extract, ToolPreview};
use conduit::prompt::PromptContext;
use conduit::runtime::{
    spawn_runtime, RuntimeCommand, RuntimeEvent, RuntimeEventStream, RuntimeHandle,
    RuntimeSpawnConfig,
};
use conduit::session::RpcAgentSession;
use conduit::stream::{StopReason, StreamEvent, ToolStatus};
use conduit::transport::{FrameQueue, MemoryChannel, RawFrame, RecordingTransport, Transport};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Pipeline {
    handle: RuntimeHandle,
    events: RuntimeEventStream,
    channel: MemoryChannel,
    sent: mpsc::UnboundedReceiver<Value>,
}

impl Pipeline {
    async fn start() -> Self {
        let channel = MemoryChannel::new();
        let frames = FrameQueue::attach(&channel);
        let (transport, sent) = RecordingTransport::new();
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let session = Arc::new(RpcAgentSession::new(Arc::clone(&transport), "s1", "/work"));
        let (handle, events) = spawn_runtime(RuntimeSpawnConfig {
            config: Config::default(),
            session,
            transport,
            frames,
        });
        let mut pipeline = Self {
            handle,
            events,
            channel,
            sent,
        };
        pipeline
            .handle
            .send(RuntimeCommand::SubmitPrompt {
                prompt: "go".to_string(),
                context: PromptContext::default(),
            })
            .await
            .expect("submit");
        // initialize (id 1) then session/prompt (id 2)
        pipeline.next_sent().await;
        let prompt = pipeline.next_sent().await;
        assert_eq!(prompt["id"], json!(2));
        pipeline
    }

    async fn next_sent(&mut self) -> Value {
        timeout(Duration::from_secs(2), self.sent.recv())
            .await
            .expect("send timeout")
            .expect("transport dropped")
    }

    async fn next_event(&mut self) -> RuntimeEvent {
        timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("event timeout")
            .expect("event stream closed")
            .event
    }

    /// Collect stream events until the run finishes.
    async fn finish(&mut self) -> (Vec<StreamEvent>, RuntimeEvent) {
        let mut stream = Vec::new();
        loop {
            match self.next_event().await {
                RuntimeEvent::Stream { event, .. } => stream.push(event),
                done @ (RuntimeEvent::RunFinished { .. } | RuntimeEvent::RunFailed { .. }) => {
                    return (stream, done);
                }
                _ => {}
            }
        }
    }
}

fn update(body: Value) -> RawFrame {
    RawFrame::new(
        json!({
            "jsonrpc": "2.0",
            "method": "session/update",
            "params": {"sessionId": "s1", "update": body},
        })
        .to_string(),
    )
}

fn text(chunk: &str) -> RawFrame {
    update(json!({
        "sessionUpdate": "agent_message_chunk",
        "content": {"type": "text", "text": chunk},
    }))
}

fn request(id: u64, method: &str, params: Value) -> RawFrame {
    RawFrame::new(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string())
}

fn end_turn() -> RawFrame {
    RawFrame::new(json!({"jsonrpc": "2.0", "id": 2, "result": {"stopReason": "end_turn"}}).to_string())
}

#[tokio::test]
async fn shell_tool_yields_one_terminal_block_with_preview() {
    let mut p = Pipeline::start().await;
    p.channel.deliver(vec![
        update(json!({
            "sessionUpdate": "tool_call",
            "toolCallId": "t1",
            "name": "run_shell_command",
            "status": "in_progress",
            "rawInput": {"command": "ls"},
        })),
        update(json!({
            "sessionUpdate": "tool_call_update",
            "toolCallId": "t1",
            "status": "completed",
            "content": [{"type": "content", "content": {"type": "text", "text": "file1\n"}}],
        })),
        end_turn(),
    ]);

    let (_, done) = p.finish().await;
    let RuntimeEvent::RunFinished {
        stop_reason,
        message,
        ..
    } = done
    else {
        panic!("expected RunFinished, got {done:?}");
    };
    assert_eq!(stop_reason, StopReason::EndTurn);
    let tools: Vec<_> = message.tool_blocks().collect();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "run_shell_command");
    assert_eq!(tools[0].status, ToolStatus::Completed);
    assert_eq!(tools[0].output, "file1\n");

    let Some(ToolPreview::Command(preview)) = extract(tools[0]) else {
        panic!("expected a command preview");
    };
    assert_eq!(preview.command.as_deref(), Some("ls"));
    assert_eq!(preview.lines, vec!["file1"]);
}

#[tokio::test]
async fn inline_think_markers_split_across_chunks() {
    let mut p = Pipeline::start().await;
    p.channel.deliver(vec![
        text("<thi"),
        text("nk>hello</think> world"),
        end_turn(),
    ]);

    let (stream, done) = p.finish().await;
    assert_eq!(
        stream,
        vec![
            StreamEvent::ReasoningStart,
            StreamEvent::ReasoningContent {
                content: "hello".to_string()
            },
            StreamEvent::ReasoningEnd,
            StreamEvent::text(" world"),
        ]
    );
    let RuntimeEvent::RunFinished { message, .. } = done else {
        panic!("expected RunFinished");
    };
    assert_eq!(
        message.blocks,
        vec![
            Block::Reasoning {
                content: "hello".to_string(),
                collapsed: true,
            },
            Block::Text {
                content: " world".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn permission_request_is_answered_once_while_stream_continues() {
    let mut p = Pipeline::start().await;
    p.channel.deliver(vec![
        RawFrame::new(
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "session/request_permission",
                "params": {
                    "sessionId": "s1",
                    "toolCall": {"toolCallId": "t9", "title": "Delete build/"},
                    "options": [
                        {"optionId": "ok", "name": "Allow", "kind": "allow_once"},
                        {"optionId": "no", "name": "Reject", "kind": "reject_once"},
                    ],
                },
            })
            .to_string(),
        ),
        text("meanwhile"),
    ]);

    let mut confirmations = 0;
    loop {
        match p.next_event().await {
            RuntimeEvent::Stream {
                event: StreamEvent::ConfirmationNeeded { request_id, .. },
                ..
            } => {
                assert_eq!(request_id, 7);
                confirmations += 1;
            }
            RuntimeEvent::Stream {
                event: StreamEvent::Text { content },
                ..
            } => {
                assert_eq!(content, "meanwhile");
                break;
            }
            _ => {}
        }
    }
    assert_eq!(confirmations, 1);

    assert!(p.handle.reject(7));
    let response = p.next_sent().await;
    assert_eq!(response["id"], json!(7));
    assert_eq!(
        response["result"],
        json!({"outcome": {"outcome": "selected", "optionId": "no"}})
    );
    assert!(!p.handle.reject(7));

    p.channel.deliver_one(end_turn());
    let (stream, _) = p.finish().await;
    assert!(stream.iter().all(|event| !event.is_interactive()));
    tokio::task::yield_now().await;
    assert!(p.sent.try_recv().is_err(), "no second response for id 7");
}

#[tokio::test]
async fn closed_channel_fails_run_and_cancels_pending_requests() {
    let mut p = Pipeline::start().await;
    p.channel.deliver_one(RawFrame::new(
        json!({
            "jsonrpc": "2.0",
            "id": 11,
            "method": "session/exit_plan_mode",
            "params": {"sessionId": "s1", "plan": "1. refactor"},
        })
        .to_string(),
    ));
    p.channel.close();

    let (_, done) = p.finish().await;
    assert!(matches!(done, RuntimeEvent::RunFailed { run_id: 1, .. }));
    let response = p.next_sent().await;
    assert_eq!(response["id"], json!(11));
    assert_eq!(response["result"], json!({"approved": false}));
    assert!(p.handle.pending_requests().is_empty());
}

#[tokio::test]
async fn question_is_announced_with_placeholder_tool_and_answered_once() {
    let mut p = Pipeline::start().await;
    p.channel.deliver_one(request(
        21,
        "session/ask_question",
        json!({
            "sessionId": "s1",
            "questions": [{
                "question": "Which database?",
                "options": [{"label": "sqlite"}, {"label": "postgres"}],
            }],
        }),
    ));

    let placeholder = p.next_event().await;
    let RuntimeEvent::Stream {
        event: StreamEvent::ToolStart { name, .. },
        ..
    } = placeholder
    else {
        panic!("expected placeholder ToolStart, got {placeholder:?}");
    };
    assert_eq!(name, "ask_user_question");
    let needed = p.next_event().await;
    let RuntimeEvent::Stream {
        event: StreamEvent::QuestionNeeded {
            request_id,
            questions,
        },
        ..
    } = needed
    else {
        panic!("expected QuestionNeeded, got {needed:?}");
    };
    assert_eq!(request_id, 21);
    assert_eq!(questions[0].question, "Which database?");
    assert_eq!(questions[0].options.len(), 2);

    let answers = BTreeMap::from([("Which database?".to_string(), "sqlite".to_string())]);
    assert!(p.handle.answer_question(21, answers.clone()));
    let response = p.next_sent().await;
    assert_eq!(response["id"], json!(21));
    assert_eq!(
        response["result"],
        json!({"outcome": "answered", "answers": {"Which database?": "sqlite"}})
    );
    assert!(!p.handle.answer_question(21, answers));
    assert!(!p.handle.cancel_request(21));

    p.channel.deliver_one(end_turn());
    p.finish().await;
    tokio::task::yield_now().await;
    assert!(p.sent.try_recv().is_err(), "no second response for id 21");
}

#[tokio::test]
async fn plan_approval_sends_approved_true_once() {
    let mut p = Pipeline::start().await;
    p.channel.deliver_one(request(
        31,
        "session/exit_plan_mode",
        json!({"sessionId": "s1", "plan": "1. add index\n2. migrate"}),
    ));

    let mut saw_placeholder = false;
    loop {
        match p.next_event().await {
            RuntimeEvent::Stream {
                event: StreamEvent::ToolStart { name, .. },
                ..
            } => {
                assert_eq!(name, "exit_plan_mode");
                saw_placeholder = true;
            }
            RuntimeEvent::Stream {
                event: StreamEvent::PlanApprovalNeeded { request_id, plan },
                ..
            } => {
                assert_eq!(request_id, 31);
                assert_eq!(plan, "1. add index\n2. migrate");
                break;
            }
            _ => {}
        }
    }
    assert!(saw_placeholder);

    // A permission answer does not fit a plan request.
    assert!(!p.handle.approve_permission(31, None));
    assert_eq!(p.handle.pending_requests(), vec![31]);

    assert!(p.handle.decide_plan(31, true));
    let response = p.next_sent().await;
    assert_eq!(response["id"], json!(31));
    assert_eq!(response["result"], json!({"approved": true}));
    assert!(!p.handle.decide_plan(31, false));
    assert!(p.handle.pending_requests().is_empty());

    p.channel.deliver_one(end_turn());
    let (_, done) = p.finish().await;
    let RuntimeEvent::RunFinished { message, .. } = done else {
        panic!("expected RunFinished, got {done:?}");
    };
    let tools: Vec<_> = message.tool_blocks().collect();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "exit_plan_mode");
    tokio::task::yield_now().await;
    assert!(p.sent.try_recv().is_err(), "no second response for id 31");
}
