//! Transport seams consumed by the stream adapter.
//!
//! Two halves of the duplex channel are modelled separately:
//! - [`RawChannel`] is the low-level inbound side. Its native API allows one
//!   receive registration at a time, and [`FrameQueue`] is the only code that
//!   registers on it.
//! - [`Transport`] is the outbound side used to send request/response
//!   envelopes back to the agent.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;

pub mod frames;
pub mod memory;

pub use frames::FrameQueue;
pub use memory::{MemoryChannel, RecordingTransport};

/// One opaque textual envelope received from the agent process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawFrame(String);

impl RawFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for RawFrame {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for RawFrame {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// One notification from the raw channel.
///
/// A single notification may carry several frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelDelivery {
    Frames(Vec<RawFrame>),
    Closed,
    Failed(String),
}

/// Callback installed as the channel's receive registration.
pub type FrameListener = Box<dyn Fn(ChannelDelivery) + Send + Sync>;

/// Low-level inbound channel with a single active receive registration.
pub trait RawChannel: Send + Sync {
    /// Install `listener`, replacing any previous registration.
    fn set_listener(&self, listener: FrameListener);
}

/// Outbound half of the duplex channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one JSON envelope to the agent.
    async fn send(&self, envelope: Value) -> Result<(), TransportError>;
}
