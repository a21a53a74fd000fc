//! Content blocks: the typed segments of an assistant message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, MessageId, ToolCallId};
use crate::tool::ToolOutcome;

/// Lifecycle status of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Processing,
    Streaming,
    Success,
    Error,
    Paused,
}

impl BlockStatus {
    /// Whether this status ends the block lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Paused)
    }
}

/// Serializable record of an error surfaced to the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorRecord {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// The typed payload of a block.
///
/// A block starts as `Placeholder` and is promoted to exactly one concrete
/// variant when the first typed event arrives; the promotion preserves the
/// block's identity and never happens twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockPayload {
    /// Provisional block created before the stream reveals its first content
    /// kind.
    Placeholder,
    /// Streamed answer text.
    MainText { content: String },
    /// Streamed reasoning text with elapsed generation time.
    Thinking { content: String, elapsed_ms: u64 },
    /// An external tool invocation correlated by id.
    Tool {
        tool_call_id: ToolCallId,
        tool_name: String,
        response: Option<ToolOutcome>,
    },
    /// Source references attached to the answer.
    Citation {
        response: Option<serde_json::Value>,
    },
    /// A generated image.
    Image {
        url: Option<String>,
        metadata: Option<serde_json::Value>,
    },
    /// A terminal error segment.
    Error { record: ErrorRecord },
}

impl BlockPayload {
    /// The discriminant of this payload.
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Placeholder => BlockKind::Placeholder,
            Self::MainText { .. } => BlockKind::MainText,
            Self::Thinking { .. } => BlockKind::Thinking,
            Self::Tool { .. } => BlockKind::Tool,
            Self::Citation { .. } => BlockKind::Citation,
            Self::Image { .. } => BlockKind::Image,
            Self::Error { .. } => BlockKind::Error,
        }
    }
}

/// Block payload discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Placeholder,
    MainText,
    Thinking,
    Tool,
    Citation,
    Image,
    Error,
}

/// A typed content segment of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBlock {
    pub id: BlockId,
    pub message_id: MessageId,
    pub status: BlockStatus,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: BlockPayload,
}

impl MessageBlock {
    /// Create a placeholder block bound to `message_id`.
    pub fn placeholder(message_id: MessageId) -> Self {
        Self {
            id: BlockId::new(),
            message_id,
            status: BlockStatus::Processing,
            created_at: Utc::now(),
            payload: BlockPayload::Placeholder,
        }
    }

    /// Create a block with a concrete payload and status.
    pub fn new(message_id: MessageId, payload: BlockPayload, status: BlockStatus) -> Self {
        Self {
            id: BlockId::new(),
            message_id,
            status,
            created_at: Utc::now(),
            payload,
        }
    }

    /// The payload discriminant.
    pub fn kind(&self) -> BlockKind {
        self.payload.kind()
    }

    /// Whether this block has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Promote a placeholder to a concrete payload in place.
    ///
    /// Returns false (and leaves the block untouched) if the block is not a
    /// placeholder; the Placeholder → concrete transition happens exactly
    /// once per block.
    pub fn promote(&mut self, payload: BlockPayload, status: BlockStatus) -> bool {
        if !matches!(self.payload, BlockPayload::Placeholder) {
            return false;
        }
        self.payload = payload;
        self.status = status;
        true
    }
}
