//! From loosely typed session messages to a flat event stream.

pub mod enrich;
pub mod events;
pub mod message;
pub mod normalizer;
pub mod tags;

pub use events::{
    PermissionOption, PermissionOptionKind, PlanEntry, PlanEntryStatus, PlanPriority, Question,
    QuestionOption, StreamEvent, ToolInput, ToolStatus,
};
pub use message::{InteractiveRequest, RequestKind, SessionMessage, StopReason, ToolCallUpdate};
pub use normalizer::EventNormalizer;
pub use tags::{TagSegment, TagSplitter};
