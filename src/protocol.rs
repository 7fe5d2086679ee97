//! JSON-RPC-shaped envelope classification and construction.
//!
//! Frames are loosely typed. Classification only looks at the shape:
//! `method` + `id` is a request from the agent, `method` alone is a
//! notification, and `id` + `result`/`error` is a response to something we
//! sent. Anything else is dropped with a diagnostic.

use crate::textutil::safe_prefix_by_bytes;
use crate::transport::RawFrame;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Method names on the wire.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const SESSION_PROMPT: &str = "session/prompt";
    pub const SESSION_CANCEL: &str = "session/cancel";
    pub const SESSION_UPDATE: &str = "session/update";
    pub const REQUEST_PERMISSION: &str = "session/request_permission";
    pub const ASK_QUESTION: &str = "session/ask_question";
    pub const EXIT_PLAN_MODE: &str = "session/exit_plan_mode";
}

pub const JSONRPC_VERSION: &str = "2.0";
/// JSON-RPC "invalid request".
pub const INVALID_REQUEST: i64 = -32600;
/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC "invalid params".
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// One classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    Response {
        id: Value,
        result: Option<Value>,
        error: Option<RpcError>,
    },
}

#[derive(Deserialize)]
struct WireEnvelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Classify a raw frame. Returns `None` for anything that is not a
/// recognizable envelope.
pub fn classify(frame: &RawFrame) -> Option<Inbound> {
    let envelope: WireEnvelope = match serde_json::from_str(frame.as_str()) {
        Ok(envelope) => envelope,
        Err(err) => {
            debug!(
                error = %err,
                frame = safe_prefix_by_bytes(frame.as_str(), 200),
                "ignoring non-envelope frame"
            );
            return None;
        }
    };

    match (envelope.method, envelope.id) {
        (Some(method), Some(id)) => Some(Inbound::Request {
            id,
            method,
            params: envelope.params.unwrap_or(Value::Null),
        }),
        (Some(method), None) => Some(Inbound::Notification {
            method,
            params: envelope.params.unwrap_or(Value::Null),
        }),
        (None, Some(id)) if envelope.result.is_some() || envelope.error.is_some() => {
            Some(Inbound::Response {
                id,
                result: envelope.result,
                error: envelope.error,
            })
        }
        _ => {
            debug!(
                frame = safe_prefix_by_bytes(frame.as_str(), 200),
                "ignoring envelope without method or result"
            );
            None
        }
    }
}

/// Numeric request id, accepting numeric strings.
pub fn numeric_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
}

pub fn response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

pub fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": code, "message": message },
    })
}
