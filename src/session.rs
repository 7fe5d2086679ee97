//! Agent session seam and its JSON-RPC implementation.
//!
//! The session is the outbound control surface: connect, submit a prompt,
//! interrupt. Inbound session messages are not read here; they arrive as raw
//! frames on the [`FrameQueue`](crate::transport::FrameQueue) the run loop
//! owns.

use crate::error::SessionError;
use crate::protocol::{self, methods};
use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Protocol version announced in `initialize`.
pub const PROTOCOL_VERSION: u64 = 1;

/// Correlates a submitted prompt with the agent's eventual response.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTicket {
    /// Id of the outbound prompt request. `None` for sessions whose prompts
    /// never get a direct response and end only through a terminal update.
    pub request_id: Option<Value>,
}

impl PromptTicket {
    /// True when `id` is the response id for this prompt.
    pub fn matches(&self, id: &Value) -> bool {
        let Some(own) = &self.request_id else {
            return false;
        };
        if own == id {
            return true;
        }
        match (protocol::numeric_id(own), protocol::numeric_id(id)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[async_trait]
pub trait AgentSession: Send + Sync {
    async fn connect(&self) -> Result<(), SessionError>;

    /// Submit prompt text for one run.
    async fn send_prompt(&self, text: &str) -> Result<PromptTicket, SessionError>;

    /// Ask the agent to stop the current run.
    async fn interrupt(&self) -> Result<(), SessionError>;
}

/// Session speaking JSON-RPC over a [`Transport`].
pub struct RpcAgentSession {
    transport: Arc<dyn Transport>,
    session_id: String,
    cwd: String,
    next_id: AtomicU64,
    connected: AtomicBool,
}

impl RpcAgentSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        session_id: impl Into<String>,
        cwd: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            session_id: session_id.into(),
            cwd: cwd.into(),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl AgentSession for RpcAgentSession {
    /// Announce the client. The agent's `initialize` response is not awaited;
    /// the run loop drops responses it did not ask for.
    async fn connect(&self) -> Result<(), SessionError> {
        let id = self.allocate_id();
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientCapabilities": {},
            "sessionId": self.session_id,
            "cwd": self.cwd,
        });
        self.transport
            .send(protocol::request(id, methods::INITIALIZE, params))
            .await?;
        self.connected.store(true, Ordering::Release);
        info!(session_id = %self.session_id, "agent session connected");
        Ok(())
    }

    async fn send_prompt(&self, text: &str) -> Result<PromptTicket, SessionError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(SessionError::NotConnected);
        }
        let id = self.allocate_id();
        let params = json!({
            "sessionId": self.session_id,
            "prompt": [{ "type": "text", "text": text }],
        });
        self.transport
            .send(protocol::request(id, methods::SESSION_PROMPT, params))
            .await?;
        debug!(request_id = id, chars = text.chars().count(), "prompt sent");
        Ok(PromptTicket {
            request_id: Some(Value::from(id)),
        })
    }

    async fn interrupt(&self) -> Result<(), SessionError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(SessionError::NotConnected);
        }
        self.transport
            .send(protocol::notification(
                methods::SESSION_CANCEL,
                json!({ "sessionId": self.session_id }),
            ))
            .await?;
        debug!(session_id = %self.session_id, "interrupt sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;

    #[tokio::test]
    async fn prompt_before_connect_is_rejected() {
        let (transport, _sent) = RecordingTransport::new();
        let session = RpcAgentSession::new(Arc::new(transport), "s1", "/work");
        assert_eq!(
            session.send_prompt("hi").await,
            Err(SessionError::NotConnected)
        );
    }

    #[tokio::test]
    async fn connect_then_prompt_sends_numbered_requests() {
        let (transport, mut sent) = RecordingTransport::new();
        let session = RpcAgentSession::new(Arc::new(transport), "s1", "/work");

        session.connect().await.unwrap();
        let ticket = session.send_prompt("list files").await.unwrap();
        session.interrupt().await.unwrap();

        let init = sent.recv().await.unwrap();
        assert_eq!(init["method"], json!("initialize"));
        assert_eq!(init["id"], json!(1));

        let prompt = sent.recv().await.unwrap();
        assert_eq!(prompt["method"], json!("session/prompt"));
        assert_eq!(prompt["params"]["prompt"][0]["text"], json!("list files"));
        assert_eq!(ticket.request_id, Some(json!(2)));

        let cancel = sent.recv().await.unwrap();
        assert_eq!(cancel["method"], json!("session/cancel"));
        assert!(cancel.get("id").is_none());
    }

    #[test]
    fn ticket_matches_numeric_and_string_ids() {
        let ticket = PromptTicket {
            request_id: Some(json!(4)),
        };
        assert!(ticket.matches(&json!(4)));
        assert!(ticket.matches(&json!("4")));
        assert!(!ticket.matches(&json!(5)));
        assert!(!PromptTicket { request_id: None }.matches(&json!(4)));
    }
}
