//! Message records and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, MessageId, TopicId};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle status of a message.
///
/// `Paused` is the terminal state for cancelled responses; cancellation is
/// not treated as failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Success,
    Error,
    Paused,
}

impl MessageStatus {
    /// Whether this status ends the message lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Paused)
    }
}

/// Opaque reference to a model configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Provider-scoped model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
}

impl ModelRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Token accounting reported by the generation collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl UsageMetrics {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A single message in a topic.
///
/// Messages own an ordered list of block ids; block contents live in
/// [`crate::MessageBlock`] records keyed by those ids. Assistant messages
/// always carry `ask_id`, the id of the user message they answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub topic_id: TopicId,
    pub role: Role,
    /// For assistant messages, the triggering user message.
    pub ask_id: Option<MessageId>,
    pub status: MessageStatus,
    /// Ordered block ids making up this message's content.
    pub block_ids: Vec<BlockId>,
    /// Model that produced (or will produce) this message.
    pub model: Option<ModelRef>,
    /// Models mentioned on a user message, requesting fan-out responses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<ModelRef>,
    pub usage: Option<UsageMetrics>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Create a user message in `Success` status (user turns are complete on
    /// arrival).
    pub fn user(topic_id: TopicId) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            topic_id,
            role: Role::User,
            ask_id: None,
            status: MessageStatus::Success,
            block_ids: Vec::new(),
            model: None,
            mentions: Vec::new(),
            usage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a pending assistant message answering `ask_id`.
    pub fn assistant(topic_id: TopicId, ask_id: MessageId) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            topic_id,
            role: Role::Assistant,
            ask_id: Some(ask_id),
            status: MessageStatus::Pending,
            block_ids: Vec::new(),
            model: None,
            mentions: Vec::new(),
            usage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the responding model.
    pub fn with_model(mut self, model: ModelRef) -> Self {
        self.model = Some(model);
        self
    }

    /// Set mentioned models on a user message.
    pub fn with_mentions(mut self, mentions: Vec<ModelRef>) -> Self {
        self.mentions = mentions;
        self
    }

    /// Append a block id, preserving arrival order.
    pub fn push_block(&mut self, block_id: BlockId) {
        self.block_ids.push(block_id);
        self.updated_at = Utc::now();
    }

    /// Reset an assistant message for regeneration: status back to pending,
    /// blocks discarded, usage cleared. The id and ask_id are preserved so
    /// the message keeps its place in the topic.
    pub fn reset(&mut self) {
        self.status = MessageStatus::Pending;
        self.block_ids.clear();
        self.usage = None;
        self.updated_at = Utc::now();
    }

    /// Whether this message is in a non-terminal (active) status.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}
