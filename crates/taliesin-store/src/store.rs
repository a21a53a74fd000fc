//! The persistence collaborator trait.

use async_trait::async_trait;

use taliesin_types::{BlockId, Message, MessageBlock, MessageId, TopicId};

use crate::error::Result;
use crate::patch::BlockPatch;

/// Storage backend for conversation records.
///
/// Writes for one topic are only ever issued from that topic's task lane, so
/// implementations need no cross-writer coordination beyond plain interior
/// mutability. `save_message_with_blocks` groups a message write with its
/// block writes as one logical mutation.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Upsert a message together with blocks, as one logical mutation.
    async fn save_message_with_blocks(
        &self,
        message: &Message,
        blocks: &[MessageBlock],
    ) -> Result<()>;

    /// Upsert a message record.
    async fn upsert_message(&self, message: &Message) -> Result<()>;

    /// Upsert block records.
    async fn upsert_blocks(&self, blocks: &[MessageBlock]) -> Result<()>;

    /// Apply a partial update to a block.
    async fn update_block(&self, id: BlockId, patch: &BlockPatch) -> Result<()>;

    /// Delete block records.
    async fn delete_blocks(&self, ids: &[BlockId]) -> Result<()>;

    /// Delete a message and report the block ids it owned.
    async fn delete_message(&self, id: MessageId) -> Result<Vec<BlockId>>;

    /// Fetch a message by id.
    async fn get_message(&self, id: MessageId) -> Result<Option<Message>>;

    /// Fetch a block by id.
    async fn get_block(&self, id: BlockId) -> Result<Option<MessageBlock>>;

    /// All messages of a topic in insertion order.
    async fn topic_messages(&self, topic_id: TopicId) -> Result<Vec<Message>>;

    /// Remove every message and block of a topic; returns removed message ids.
    async fn clear_topic(&self, topic_id: TopicId) -> Result<Vec<MessageId>>;
}
