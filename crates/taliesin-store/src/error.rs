//! Error types for store operations.

use taliesin_types::{BlockId, MessageId, TopicId};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Message was not found.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// Block was not found.
    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    /// Topic was not found.
    #[error("topic not found: {0}")]
    TopicNotFound(TopicId),

    /// Error from the storage backend.
    #[error("storage error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
