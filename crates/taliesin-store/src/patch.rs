//! Partial block updates.

use taliesin_types::{
    BlockKind, BlockPayload, BlockStatus, ErrorRecord, MessageBlock, ToolCallId, ToolOutcome,
};

/// A partial update to a block.
///
/// Patches carry the *full* accumulated content for streaming kinds, not a
/// delta: applying only the most recent patch of a burst yields the same
/// block state as applying every one, which is what makes write coalescing
/// safe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockPatch {
    /// Promote a placeholder to this concrete kind (ignored on non-placeholder
    /// blocks).
    pub promote_to: Option<BlockKind>,
    pub status: Option<BlockStatus>,
    /// Full accumulated text for MainText/Thinking blocks.
    pub content: Option<String>,
    /// Elapsed generation time for Thinking blocks.
    pub elapsed_ms: Option<u64>,
    /// Correlation id, set when promoting a placeholder to a Tool block.
    pub tool_call_id: Option<ToolCallId>,
    /// Tool name, set when promoting a placeholder to a Tool block.
    pub tool_name: Option<String>,
    pub tool_response: Option<ToolOutcome>,
    pub citation: Option<serde_json::Value>,
    pub image_url: Option<String>,
    pub image_metadata: Option<serde_json::Value>,
    pub error: Option<ErrorRecord>,
}

impl BlockPatch {
    /// A patch that only changes status.
    pub fn status(status: BlockStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// A streaming-content patch.
    pub fn streaming_content(content: impl Into<String>) -> Self {
        Self {
            status: Some(BlockStatus::Streaming),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: BlockStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn with_promotion(mut self, kind: BlockKind) -> Self {
        self.promote_to = Some(kind);
        self
    }

    /// Whether this patch carries a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(|s| s.is_terminal())
    }

    /// Apply this patch to a block in place.
    ///
    /// Promotion only takes effect on placeholder blocks; payload fields only
    /// land on the matching payload variant. Mismatched fields are ignored;
    /// patches are advisory, the block's type is authoritative.
    pub fn apply(&self, block: &mut MessageBlock) {
        if let Some(kind) = self.promote_to
            && matches!(block.payload, BlockPayload::Placeholder)
        {
            block.payload = self.empty_payload(kind);
        }

        match &mut block.payload {
            BlockPayload::Placeholder => {}
            BlockPayload::MainText { content } => {
                if let Some(new) = &self.content {
                    *content = new.clone();
                }
            }
            BlockPayload::Thinking {
                content,
                elapsed_ms,
            } => {
                if let Some(new) = &self.content {
                    *content = new.clone();
                }
                if let Some(ms) = self.elapsed_ms {
                    *elapsed_ms = ms;
                }
            }
            BlockPayload::Tool { response, .. } => {
                if let Some(new) = &self.tool_response {
                    *response = Some(new.clone());
                }
            }
            BlockPayload::Citation { response } => {
                if let Some(new) = &self.citation {
                    *response = Some(new.clone());
                }
            }
            BlockPayload::Image { url, metadata } => {
                if let Some(new) = &self.image_url {
                    *url = Some(new.clone());
                }
                if let Some(new) = &self.image_metadata {
                    *metadata = Some(new.clone());
                }
            }
            BlockPayload::Error { record } => {
                if let Some(new) = &self.error {
                    *record = new.clone();
                }
            }
        }

        if let Some(status) = self.status {
            block.status = status;
        }
    }

    fn empty_payload(&self, kind: BlockKind) -> BlockPayload {
        match kind {
            BlockKind::Placeholder => BlockPayload::Placeholder,
            BlockKind::MainText => BlockPayload::MainText {
                content: String::new(),
            },
            BlockKind::Thinking => BlockPayload::Thinking {
                content: String::new(),
                elapsed_ms: 0,
            },
            BlockKind::Tool => BlockPayload::Tool {
                tool_call_id: self
                    .tool_call_id
                    .clone()
                    .unwrap_or_else(|| ToolCallId::new("")),
                tool_name: self.tool_name.clone().unwrap_or_default(),
                response: None,
            },
            BlockKind::Citation => BlockPayload::Citation { response: None },
            BlockKind::Image => BlockPayload::Image {
                url: None,
                metadata: None,
            },
            BlockKind::Error => BlockPayload::Error {
                record: self.error.clone().unwrap_or_default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taliesin_types::MessageId;

    #[test]
    fn test_patch_promotes_placeholder() {
        let mut block = MessageBlock::placeholder(MessageId::new());
        let patch = BlockPatch::streaming_content("hi").with_promotion(BlockKind::MainText);
        patch.apply(&mut block);

        assert_eq!(block.kind(), BlockKind::MainText);
        assert_eq!(block.status, BlockStatus::Streaming);
        assert!(matches!(
            &block.payload,
            BlockPayload::MainText { content } if content == "hi"
        ));
    }

    #[test]
    fn test_promotion_ignored_on_concrete_block() {
        let mut block = MessageBlock::new(
            MessageId::new(),
            BlockPayload::MainText {
                content: "text".to_string(),
            },
            BlockStatus::Streaming,
        );
        let patch = BlockPatch::default().with_promotion(BlockKind::Thinking);
        patch.apply(&mut block);
        assert_eq!(block.kind(), BlockKind::MainText);
    }

    #[test]
    fn test_content_replaces_not_appends() {
        let mut block = MessageBlock::new(
            MessageId::new(),
            BlockPayload::MainText {
                content: "hel".to_string(),
            },
            BlockStatus::Streaming,
        );
        BlockPatch::streaming_content("hello").apply(&mut block);
        assert!(matches!(
            &block.payload,
            BlockPayload::MainText { content } if content == "hello"
        ));
    }

    #[test]
    fn test_mismatched_fields_ignored() {
        let mut block = MessageBlock::new(
            MessageId::new(),
            BlockPayload::Image {
                url: None,
                metadata: None,
            },
            BlockStatus::Streaming,
        );
        // A text-content patch has nothing to say to an image block.
        BlockPatch::default()
            .with_content("text")
            .with_status(BlockStatus::Success)
            .apply(&mut block);

        assert!(matches!(&block.payload, BlockPayload::Image { url: None, .. }));
        assert_eq!(block.status, BlockStatus::Success);
    }

    #[test]
    fn test_is_terminal() {
        assert!(BlockPatch::status(BlockStatus::Success).is_terminal());
        assert!(BlockPatch::status(BlockStatus::Paused).is_terminal());
        assert!(!BlockPatch::streaming_content("x").is_terminal());
    }

    #[test]
    fn test_thinking_elapsed_ms() {
        let mut block = MessageBlock::new(
            MessageId::new(),
            BlockPayload::Thinking {
                content: String::new(),
                elapsed_ms: 0,
            },
            BlockStatus::Streaming,
        );
        BlockPatch::streaming_content("hmm")
            .with_elapsed_ms(420)
            .apply(&mut block);

        assert!(matches!(
            &block.payload,
            BlockPayload::Thinking { content, elapsed_ms } if content == "hmm" && *elapsed_ms == 420
        ));
    }
}
