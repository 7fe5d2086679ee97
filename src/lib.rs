//! Conduit: a streaming protocol adapter for agent sessions.
//!
//! Raw frames from an agent arrive on a single-registration channel, pass
//! through a pull-based [`transport::FrameQueue`], and are normalized into a
//! flat [`stream::StreamEvent`] vocabulary. A [`document::BlockBuilder`] folds
//! those events into a typed conversation document, while interactive
//! requests (permissions, questions, plan approval) are correlated by id and
//! answered without stalling the stream.
//!
//! # Quick start
//!
//! ```no_run
//! use conduit::config::load_config;
//! use conduit::prompt::PromptContext;
//! use conduit::runtime::{spawn_runtime, RuntimeCommand, RuntimeSpawnConfig};
//! use conduit::session::RpcAgentSession;
//! use conduit::transport::{FrameQueue, MemoryChannel, RecordingTransport, Transport};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let channel = MemoryChannel::new();
//! let (transport, _sent) = RecordingTransport::new();
//! let transport: Arc<dyn Transport> = Arc::new(transport);
//! let session = Arc::new(RpcAgentSession::new(Arc::clone(&transport), "s1", "."));
//! let (handle, mut events) = spawn_runtime(RuntimeSpawnConfig {
//!     config,
//!     session,
//!     transport,
//!     frames: FrameQueue::attach(&channel),
//! });
//! handle
//!     .send(RuntimeCommand::SubmitPrompt {
//!         prompt: "list files".into(),
//!         context: PromptContext::default(),
//!     })
//!     .await
//!     .unwrap();
//! while let Some(envelope) = events.recv().await {
//!     println!("{:?}", envelope.event);
//! }
//! # }
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod preview;
pub mod prompt;
pub mod protocol;
pub mod render;
pub mod runtime;
pub mod session;
pub mod stream;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod transport;
