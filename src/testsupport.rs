//! Shared test fixtures for stream, runtime and prompt test modules.
//!
//! Frame builders produce the wire envelopes an agent would send so each test
//! module does not hand-assemble JSON-RPC frames.

use crate::transport::RawFrame;
use serde_json::{json, Value};

/// `session/update` notification wrapping one update body.
pub fn session_update(update: Value) -> RawFrame {
    RawFrame::new(
        json!({
            "jsonrpc": "2.0",
            "method": "session/update",
            "params": {"sessionId": "s1", "update": update},
        })
        .to_string(),
    )
}

pub fn text_chunk(text: &str) -> RawFrame {
    session_update(json!({
        "sessionUpdate": "agent_message_chunk",
        "content": {"type": "text", "text": text},
    }))
}

pub fn thought_chunk(text: &str) -> RawFrame {
    session_update(json!({
        "sessionUpdate": "agent_thought_chunk",
        "content": {"type": "text", "text": text},
    }))
}

/// Initial `tool_call` announcement in progress.
pub fn tool_call(id: &str, name: &str, raw_input: Value) -> RawFrame {
    session_update(json!({
        "sessionUpdate": "tool_call",
        "toolCallId": id,
        "name": name,
        "status": "in_progress",
        "rawInput": raw_input,
    }))
}

/// Status update for an earlier tool call. The name is omitted on purpose.
pub fn tool_call_update(id: &str, status: &str, raw_output: Option<&str>) -> RawFrame {
    let mut update = json!({
        "sessionUpdate": "tool_call_update",
        "toolCallId": id,
        "status": status,
    });
    if let Some(output) = raw_output {
        update["rawOutput"] = json!(output);
    }
    session_update(update)
}

/// `session/request_permission` with one allow and one reject option.
pub fn permission_request(id: u64, tool_call_id: &str, title: &str) -> RawFrame {
    RawFrame::new(
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "session/request_permission",
            "params": {
                "sessionId": "s1",
                "toolCall": {"toolCallId": tool_call_id, "title": title},
                "options": [
                    {"optionId": "allow-once", "name": "Allow", "kind": "allow_once"},
                    {"optionId": "reject-once", "name": "Reject", "kind": "reject_once"},
                ],
            },
        })
        .to_string(),
    )
}

/// Response to the prompt request `id`.
pub fn prompt_response(id: u64, stop_reason: &str) -> RawFrame {
    RawFrame::new(
        json!({"jsonrpc": "2.0", "id": id, "result": {"stopReason": stop_reason}}).to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{classify, Inbound};

    #[test]
    fn frame_builders_classify_as_expected() {
        assert!(matches!(
            classify(&text_chunk("hi")),
            Some(Inbound::Notification { ref method, .. }) if method == "session/update"
        ));
        assert!(matches!(
            classify(&permission_request(7, "c1", "Run ls")),
            Some(Inbound::Request { ref id, .. }) if *id == json!(7)
        ));
        assert!(matches!(
            classify(&prompt_response(2, "end_turn")),
            Some(Inbound::Response { error: None, .. })
        ));
    }
}
