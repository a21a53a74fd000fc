//! Shared types for the Taliesin conversation pipeline.
//!
//! This crate defines the vocabulary the rest of the workspace speaks:
//! - [`Message`] and [`MessageBlock`]: the persisted conversation record
//! - [`MessageStatus`] / [`BlockStatus`]: lifecycle states with terminality
//! - [`AssistantProfile`]: per-assistant configuration driving the pipeline
//! - Tool vocabulary: [`ToolInvocation`], [`ToolOutcome`], [`ToolServerRef`]

mod block;
mod ids;
mod message;
mod profile;
mod tool;

pub use block::{BlockKind, BlockPayload, BlockStatus, ErrorRecord, MessageBlock};
pub use ids::{BlockId, IdParseError, MessageId, ToolCallId, TopicId};
pub use message::{Message, MessageStatus, ModelRef, Role, UsageMetrics};
pub use profile::AssistantProfile;
pub use tool::{ToolContent, ToolInvocation, ToolOutcome, ToolServerRef};
