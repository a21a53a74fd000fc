//! In-memory reference store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use taliesin_types::{BlockId, Message, MessageBlock, MessageId, TopicId};

use crate::error::Result;
use crate::patch::BlockPatch;
use crate::store::ConversationStore;

#[derive(Default)]
struct State {
    messages: HashMap<MessageId, Message>,
    blocks: HashMap<BlockId, MessageBlock>,
    topics: HashMap<TopicId, Vec<MessageId>>,
    block_writes: HashMap<BlockId, usize>,
    total_writes: usize,
}

/// In-memory [`ConversationStore`].
///
/// Counts writes per block so tests can assert throttle volume: every
/// `upsert_blocks` entry and every `update_block` call increments the target
/// block's counter.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many writes have hit the given block.
    pub fn block_write_count(&self, id: BlockId) -> usize {
        self.state.read().block_writes.get(&id).copied().unwrap_or(0)
    }

    /// Total write operations across all records.
    pub fn total_writes(&self) -> usize {
        self.state.read().total_writes
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> usize {
        self.state.read().blocks.len()
    }

    fn record_block_write(state: &mut State, id: BlockId) {
        *state.block_writes.entry(id).or_insert(0) += 1;
        state.total_writes += 1;
    }

    fn store_message(state: &mut State, message: &Message) {
        let order = state.topics.entry(message.topic_id).or_default();
        if !order.contains(&message.id) {
            order.push(message.id);
        }
        state.messages.insert(message.id, message.clone());
        state.total_writes += 1;
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn save_message_with_blocks(
        &self,
        message: &Message,
        blocks: &[MessageBlock],
    ) -> Result<()> {
        let mut state = self.state.write();
        Self::store_message(&mut state, message);
        for block in blocks {
            state.blocks.insert(block.id, block.clone());
            Self::record_block_write(&mut state, block.id);
        }
        Ok(())
    }

    async fn upsert_message(&self, message: &Message) -> Result<()> {
        let mut state = self.state.write();
        Self::store_message(&mut state, message);
        Ok(())
    }

    async fn upsert_blocks(&self, blocks: &[MessageBlock]) -> Result<()> {
        let mut state = self.state.write();
        for block in blocks {
            state.blocks.insert(block.id, block.clone());
            Self::record_block_write(&mut state, block.id);
        }
        Ok(())
    }

    async fn update_block(&self, id: BlockId, patch: &BlockPatch) -> Result<()> {
        let mut state = self.state.write();
        let Some(block) = state.blocks.get_mut(&id) else {
            warn!(block_id = %id, "update for unknown block, skipping");
            return Ok(());
        };

        // A coalesced write can race the flush that finalized the block;
        // terminal state is authoritative and must not be rewound.
        if block.is_terminal() && !patch.is_terminal() {
            warn!(block_id = %id, "stale non-terminal write after finalization, skipping");
            return Ok(());
        }

        patch.apply(block);
        Self::record_block_write(&mut state, id);
        Ok(())
    }

    async fn delete_blocks(&self, ids: &[BlockId]) -> Result<()> {
        let mut state = self.state.write();
        for id in ids {
            state.blocks.remove(id);
            state.block_writes.remove(id);
        }
        Ok(())
    }

    async fn delete_message(&self, id: MessageId) -> Result<Vec<BlockId>> {
        let mut state = self.state.write();
        let Some(message) = state.messages.remove(&id) else {
            return Ok(Vec::new());
        };
        if let Some(order) = state.topics.get_mut(&message.topic_id) {
            order.retain(|m| *m != id);
        }
        for block_id in &message.block_ids {
            state.blocks.remove(block_id);
            state.block_writes.remove(block_id);
        }
        Ok(message.block_ids)
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.state.read().messages.get(&id).cloned())
    }

    async fn get_block(&self, id: BlockId) -> Result<Option<MessageBlock>> {
        Ok(self.state.read().blocks.get(&id).cloned())
    }

    async fn topic_messages(&self, topic_id: TopicId) -> Result<Vec<Message>> {
        let state = self.state.read();
        let order = state.topics.get(&topic_id).cloned().unwrap_or_default();
        Ok(order
            .iter()
            .filter_map(|id| state.messages.get(id).cloned())
            .collect())
    }

    async fn clear_topic(&self, topic_id: TopicId) -> Result<Vec<MessageId>> {
        let mut state = self.state.write();
        let order = state.topics.remove(&topic_id).unwrap_or_default();
        for message_id in &order {
            if let Some(message) = state.messages.remove(message_id) {
                for block_id in &message.block_ids {
                    state.blocks.remove(block_id);
                    state.block_writes.remove(block_id);
                }
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taliesin_types::{BlockPayload, BlockStatus};

    fn text_block(message_id: MessageId, content: &str) -> MessageBlock {
        MessageBlock::new(
            message_id,
            BlockPayload::MainText {
                content: content.to_string(),
            },
            BlockStatus::Streaming,
        )
    }

    #[tokio::test]
    async fn test_save_and_read_back() {
        let store = MemoryStore::new();
        let topic = TopicId::new();
        let mut message = Message::user(topic);
        let block = text_block(message.id, "hello");
        message.push_block(block.id);

        store
            .save_message_with_blocks(&message, std::slice::from_ref(&block))
            .await
            .unwrap();

        let loaded = store.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(loaded.block_ids, vec![block.id]);
        assert!(store.get_block(block.id).await.unwrap().is_some());

        let topic_messages = store.topic_messages(topic).await.unwrap();
        assert_eq!(topic_messages.len(), 1);
    }

    #[tokio::test]
    async fn test_update_block_counts_writes() {
        let store = MemoryStore::new();
        let message = Message::user(TopicId::new());
        let block = text_block(message.id, "a");
        store.upsert_blocks(&[block.clone()]).await.unwrap();

        store
            .update_block(block.id, &BlockPatch::streaming_content("ab"))
            .await
            .unwrap();
        store
            .update_block(block.id, &BlockPatch::streaming_content("abc"))
            .await
            .unwrap();

        assert_eq!(store.block_write_count(block.id), 3);
        let loaded = store.get_block(block.id).await.unwrap().unwrap();
        assert!(matches!(
            loaded.payload,
            BlockPayload::MainText { content } if content == "abc"
        ));
    }

    #[tokio::test]
    async fn test_stale_write_cannot_rewind_terminal_block() {
        let store = MemoryStore::new();
        let message = Message::user(TopicId::new());
        let block = text_block(message.id, "final");
        store.upsert_blocks(&[block.clone()]).await.unwrap();

        store
            .update_block(block.id, &BlockPatch::status(BlockStatus::Success))
            .await
            .unwrap();
        // A stale throttled write arriving late must be dropped.
        store
            .update_block(block.id, &BlockPatch::streaming_content("stale"))
            .await
            .unwrap();

        let loaded = store.get_block(block.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, BlockStatus::Success);
        assert!(matches!(
            loaded.payload,
            BlockPayload::MainText { content } if content == "final"
        ));
    }

    #[tokio::test]
    async fn test_delete_message_removes_blocks() {
        let store = MemoryStore::new();
        let topic = TopicId::new();
        let mut message = Message::user(topic);
        let block = text_block(message.id, "bye");
        message.push_block(block.id);
        store
            .save_message_with_blocks(&message, &[block.clone()])
            .await
            .unwrap();

        let removed = store.delete_message(message.id).await.unwrap();
        assert_eq!(removed, vec![block.id]);
        assert!(store.get_message(message.id).await.unwrap().is_none());
        assert!(store.get_block(block.id).await.unwrap().is_none());
        assert!(store.topic_messages(topic).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_topic() {
        let store = MemoryStore::new();
        let topic = TopicId::new();
        for _ in 0..3 {
            let message = Message::user(topic);
            store.upsert_message(&message).await.unwrap();
        }

        let removed = store.clear_topic(topic).await.unwrap();
        assert_eq!(removed.len(), 3);
        assert!(store.topic_messages(topic).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_topic_messages_preserve_order() {
        let store = MemoryStore::new();
        let topic = TopicId::new();
        let first = Message::user(topic);
        let second = Message::assistant(topic, first.id);
        store.upsert_message(&first).await.unwrap();
        store.upsert_message(&second).await.unwrap();
        // Re-upserting must not duplicate or reorder.
        store.upsert_message(&first).await.unwrap();

        let messages = store.topic_messages(topic).await.unwrap();
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
