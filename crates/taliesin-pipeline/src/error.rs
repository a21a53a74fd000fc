//! Error types for the pipeline crate.

use thiserror::Error;

use taliesin_types::MessageId;

/// Result type alias using the pipeline error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Error from the persistence collaborator.
    #[error("store error: {0}")]
    Store(#[from] taliesin_store::Error),

    /// Error from the generation collaborator.
    #[error("generation error: {0}")]
    Generation(#[from] crate::generation::GenerationError),

    /// A referenced message does not exist.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// An assistant message is missing its triggering user message.
    #[error("assistant message {0} has no triggering message")]
    MissingAskId(MessageId),

    /// A user message was submitted with no content blocks.
    #[error("message has no content blocks")]
    EmptyMessage,
}
