//! In-process channel and transport.
//!
//! `MemoryChannel` behaves like the native single-registration channel:
//! installing a listener replaces the previous one, and deliveries made with
//! no listener are lost. `RecordingTransport` captures outbound envelopes on
//! an unbounded channel. Both back `conduit replay` and the test suites.

use super::{ChannelDelivery, FrameListener, RawChannel, RawFrame, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
pub struct MemoryChannel {
    listener: Mutex<Option<FrameListener>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a batch of frames in one notification.
    ///
    /// Returns false when nobody is registered and the batch was dropped.
    pub fn deliver(&self, frames: Vec<RawFrame>) -> bool {
        self.notify(ChannelDelivery::Frames(frames))
    }

    pub fn deliver_one(&self, frame: impl Into<RawFrame>) -> bool {
        self.deliver(vec![frame.into()])
    }

    pub fn close(&self) -> bool {
        self.notify(ChannelDelivery::Closed)
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.notify(ChannelDelivery::Failed(message.into()))
    }

    fn notify(&self, delivery: ChannelDelivery) -> bool {
        let guard = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(listener) => {
                listener(delivery);
                true
            }
            None => {
                debug!("memory channel delivery dropped: no listener");
                false
            }
        }
    }
}

impl RawChannel for MemoryChannel {
    fn set_listener(&self, listener: FrameListener) {
        *self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(listener);
    }
}

/// Transport that records every outbound envelope.
pub struct RecordingTransport {
    sent: mpsc::UnboundedSender<Value>,
}

impl RecordingTransport {
    /// Build a transport plus the receiver observing what it sends.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (sent, rx) = mpsc::unbounded_channel();
        (Self { sent }, rx)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, envelope: Value) -> Result<(), TransportError> {
        self.sent
            .send(envelope)
            .map_err(|_| TransportError::Send("recording receiver dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn delivery_without_listener_is_dropped() {
        let channel = MemoryChannel::new();
        assert!(!channel.deliver_one("lost"));
    }

    #[test]
    fn new_listener_replaces_previous_registration() {
        let channel = MemoryChannel::new();
        let first = Arc::new(Mutex::new(Vec::<ChannelDelivery>::new()));
        let second = Arc::new(Mutex::new(Vec::<ChannelDelivery>::new()));

        let sink = Arc::clone(&first);
        channel.set_listener(Box::new(move |d| sink.lock().unwrap().push(d)));
        let sink = Arc::clone(&second);
        channel.set_listener(Box::new(move |d| sink.lock().unwrap().push(d)));

        assert!(channel.deliver_one("x"));
        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recording_transport_captures_envelopes() {
        let (transport, mut rx) = RecordingTransport::new();
        transport.send(json!({"id": 1})).await.unwrap();
        assert_eq!(rx.recv().await, Some(json!({"id": 1})));

        drop(rx);
        assert!(transport.send(json!({"id": 2})).await.is_err());
    }
}
