//! The block state machine: turns generation events into block mutations.
//!
//! One [`BlockAssembler`] lives for one generation attempt. It owns the
//! streaming accumulation state (full main text, full thinking text, the
//! placeholder, the tool correlation map) and emits [`BlockMutation`]s for the
//! orchestrator to route into the throttler, store, and view feed. It never
//! touches storage itself.

use std::collections::HashMap;

use tracing::{error, warn};

use taliesin_store::BlockPatch;
use taliesin_types::{
    BlockId, BlockKind, BlockPayload, BlockStatus, ErrorRecord, MessageBlock, MessageId,
    MessageStatus, ToolCallId, UsageMetrics,
};

use crate::generation::{GenerationEvent, ToolEventStatus};

/// A mutation produced by the state machine.
///
/// The variants encode the write discipline, not just the data: `Write` goes
/// to the store immediately, `Throttled` through the coalescing window, and
/// `Finalize` cancels any pending coalesced write before the terminal state
/// is persisted synchronously.
#[derive(Debug, Clone)]
pub enum BlockMutation {
    /// A new block appended to the message.
    Create(MessageBlock),
    /// An immediate, unthrottled block update.
    Write { id: BlockId, patch: BlockPatch },
    /// A high-frequency update routed through the persistence throttler.
    Throttled { id: BlockId, patch: BlockPatch },
    /// A terminal update: flush pending writes, then persist synchronously.
    Finalize { id: BlockId, patch: BlockPatch },
    /// The message itself reaches a terminal status.
    CloseMessage {
        status: MessageStatus,
        usage: Option<UsageMetrics>,
    },
}

/// Per-attempt block assembly state machine.
#[derive(Debug)]
pub struct BlockAssembler {
    message_id: MessageId,
    accumulated_text: String,
    accumulated_thinking: String,
    placeholder: Option<BlockId>,
    main_text: Option<BlockId>,
    thinking: Option<BlockId>,
    image: Option<BlockId>,
    citation: Option<BlockId>,
    active_tool: Option<BlockId>,
    tool_blocks: HashMap<ToolCallId, BlockId>,
    last_block: Option<BlockId>,
    saw_web_search: bool,
}

impl BlockAssembler {
    /// Create an assembler for one assistant message attempt.
    pub fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            accumulated_text: String::new(),
            accumulated_thinking: String::new(),
            placeholder: None,
            main_text: None,
            thinking: None,
            image: None,
            citation: None,
            active_tool: None,
            tool_blocks: HashMap::new(),
            last_block: None,
            saw_web_search: false,
        }
    }

    /// The block currently accumulating main text, if any.
    pub fn active_text_block(&self) -> Option<BlockId> {
        self.main_text.or(self.placeholder)
    }

    /// Apply one event.
    ///
    /// `aborted` marks error events caused by cancellation, which finalize as
    /// `Paused` rather than `Error`.
    pub fn apply(&mut self, event: &GenerationEvent, aborted: bool) -> Vec<BlockMutation> {
        match event {
            GenerationEvent::Created => self.on_created(),
            GenerationEvent::TextChunk { text } => self.on_text_chunk(text),
            GenerationEvent::TextComplete { text } => self.on_text_complete(text),
            GenerationEvent::ThinkingChunk { text, elapsed_ms } => {
                self.on_thinking_chunk(text, *elapsed_ms)
            }
            GenerationEvent::ThinkingComplete { text, elapsed_ms } => {
                self.on_thinking_complete(text, *elapsed_ms)
            }
            GenerationEvent::ToolInProgress { id, tool_name } => {
                self.on_tool_in_progress(id, tool_name)
            }
            GenerationEvent::ToolComplete {
                id,
                status,
                response,
            } => self.on_tool_complete(id, *status, response.clone()),
            GenerationEvent::ExternalToolInProgress => self.on_external_tool_in_progress(),
            GenerationEvent::ExternalToolComplete { result } => {
                self.on_citation_complete(result.clone(), false)
            }
            GenerationEvent::WebSearchInProgress => self.on_web_search_in_progress(),
            GenerationEvent::WebSearchComplete { result } => {
                self.on_citation_complete(result.clone(), true)
            }
            GenerationEvent::ImageCreated => self.on_image_created(),
            GenerationEvent::ImageDelta { image } => self.on_image_delta(image),
            GenerationEvent::ImageGenerated { image } => self.on_image_generated(image.as_ref()),
            GenerationEvent::Error { record } => self.on_error(record.clone(), aborted),
            GenerationEvent::Complete { usage } => self.on_complete(*usage),
        }
    }

    /// Finalize a stream that was cancelled without a terminal event.
    pub fn finalize_cancelled(&mut self) -> Vec<BlockMutation> {
        let mut out = Vec::new();
        for id in self.drain_open_blocks() {
            out.push(BlockMutation::Finalize {
                id,
                patch: BlockPatch::status(BlockStatus::Paused),
            });
        }
        out.push(BlockMutation::CloseMessage {
            status: MessageStatus::Paused,
            usage: None,
        });
        out
    }

    // ── event handlers ───────────────────────────────────────────────────────

    fn on_created(&mut self) -> Vec<BlockMutation> {
        let block = MessageBlock::placeholder(self.message_id);
        self.placeholder = Some(block.id);
        vec![self.transition(block, BlockKind::Placeholder)]
    }

    fn on_text_chunk(&mut self, text: &str) -> Vec<BlockMutation> {
        self.accumulated_text.push_str(text);

        if let Some(id) = self.main_text {
            return vec![BlockMutation::Throttled {
                id,
                patch: BlockPatch::streaming_content(self.accumulated_text.clone()),
            }];
        }

        if let Some(id) = self.placeholder.take() {
            // Reclassify the placeholder in place: same block, new type.
            self.main_text = Some(id);
            self.last_block = Some(id);
            return vec![BlockMutation::Write {
                id,
                patch: BlockPatch::streaming_content(self.accumulated_text.clone())
                    .with_promotion(BlockKind::MainText),
            }];
        }

        let block = MessageBlock::new(
            self.message_id,
            BlockPayload::MainText {
                content: self.accumulated_text.clone(),
            },
            BlockStatus::Streaming,
        );
        self.main_text = Some(block.id);
        vec![self.transition(block, BlockKind::MainText)]
    }

    fn on_text_complete(&mut self, text: &str) -> Vec<BlockMutation> {
        let mut out = Vec::new();
        match self.main_text.take() {
            Some(id) => out.push(BlockMutation::Finalize {
                id,
                patch: BlockPatch::default()
                    .with_content(text)
                    .with_status(BlockStatus::Success),
            }),
            None => {
                // Malformed interleaving from the collaborator; tolerate it.
                warn!(
                    message_id = %self.message_id,
                    "text_complete with no active main-text block, ignoring"
                );
            }
        }
        if let Some(id) = self.citation
            && !self.saw_web_search
        {
            self.citation = None;
            out.push(BlockMutation::Finalize {
                id,
                patch: BlockPatch::status(BlockStatus::Success),
            });
        }
        out
    }

    fn on_thinking_chunk(&mut self, text: &str, elapsed_ms: u64) -> Vec<BlockMutation> {
        self.accumulated_thinking.push_str(text);

        if let Some(id) = self.thinking {
            return vec![BlockMutation::Throttled {
                id,
                patch: BlockPatch::streaming_content(self.accumulated_thinking.clone())
                    .with_elapsed_ms(elapsed_ms),
            }];
        }

        if let Some(id) = self.placeholder.take() {
            self.thinking = Some(id);
            self.last_block = Some(id);
            return vec![BlockMutation::Write {
                id,
                patch: BlockPatch::streaming_content(self.accumulated_thinking.clone())
                    .with_promotion(BlockKind::Thinking),
            }];
        }

        let block = MessageBlock::new(
            self.message_id,
            BlockPayload::Thinking {
                content: self.accumulated_thinking.clone(),
                elapsed_ms,
            },
            BlockStatus::Streaming,
        );
        self.thinking = Some(block.id);
        vec![self.transition(block, BlockKind::Thinking)]
    }

    fn on_thinking_complete(&mut self, text: &str, elapsed_ms: u64) -> Vec<BlockMutation> {
        match self.thinking.take() {
            Some(id) => vec![BlockMutation::Finalize {
                id,
                patch: BlockPatch::default()
                    .with_content(text)
                    .with_elapsed_ms(elapsed_ms)
                    .with_status(BlockStatus::Success),
            }],
            None => {
                warn!(
                    message_id = %self.message_id,
                    "thinking_complete with no active thinking block, ignoring"
                );
                Vec::new()
            }
        }
    }

    fn on_tool_in_progress(&mut self, id: &ToolCallId, tool_name: &str) -> Vec<BlockMutation> {
        if let Some(block_id) = self.placeholder.take() {
            self.active_tool = Some(block_id);
            self.last_block = Some(block_id);
            self.tool_blocks.insert(id.clone(), block_id);
            let mut patch = BlockPatch::status(BlockStatus::Processing)
                .with_promotion(BlockKind::Tool);
            patch.tool_call_id = Some(id.clone());
            patch.tool_name = Some(tool_name.to_string());
            return vec![BlockMutation::Write {
                id: block_id,
                patch,
            }];
        }

        let block = MessageBlock::new(
            self.message_id,
            BlockPayload::Tool {
                tool_call_id: id.clone(),
                tool_name: tool_name.to_string(),
                response: None,
            },
            BlockStatus::Processing,
        );
        self.active_tool = Some(block.id);
        self.tool_blocks.insert(id.clone(), block.id);
        vec![self.transition(block, BlockKind::Tool)]
    }

    fn on_tool_complete(
        &mut self,
        id: &ToolCallId,
        status: ToolEventStatus,
        response: Option<taliesin_types::ToolOutcome>,
    ) -> Vec<BlockMutation> {
        let Some(block_id) = self.tool_blocks.remove(id) else {
            // Completion for a call we never saw start. Fail loudly, keep going.
            error!(
                message_id = %self.message_id,
                tool_call_id = %id,
                "tool_complete for unknown correlation id, ignoring"
            );
            return Vec::new();
        };
        if self.active_tool == Some(block_id) {
            self.active_tool = None;
        }

        let final_status = match status {
            ToolEventStatus::Done => BlockStatus::Success,
            ToolEventStatus::Error => BlockStatus::Error,
        };
        let mut patch = BlockPatch::status(final_status);
        patch.tool_response = response;
        if final_status == BlockStatus::Error {
            patch.error = Some(ErrorRecord::new("tool_error", "tool execution failed"));
        }
        vec![BlockMutation::Finalize {
            id: block_id,
            patch,
        }]
    }

    fn on_external_tool_in_progress(&mut self) -> Vec<BlockMutation> {
        let block = MessageBlock::new(
            self.message_id,
            BlockPayload::Citation { response: None },
            BlockStatus::Processing,
        );
        self.citation = Some(block.id);
        vec![self.transition(block, BlockKind::Citation)]
    }

    fn on_web_search_in_progress(&mut self) -> Vec<BlockMutation> {
        if let Some(id) = self.placeholder.take() {
            self.citation = Some(id);
            self.last_block = Some(id);
            return vec![BlockMutation::Write {
                id,
                patch: BlockPatch::status(BlockStatus::Processing)
                    .with_promotion(BlockKind::Citation),
            }];
        }
        self.on_external_tool_in_progress()
    }

    fn on_citation_complete(
        &mut self,
        result: serde_json::Value,
        web_search: bool,
    ) -> Vec<BlockMutation> {
        if web_search {
            self.saw_web_search = true;
        }
        match self.citation.take() {
            Some(id) => {
                let mut patch = BlockPatch::status(BlockStatus::Success);
                patch.citation = Some(result);
                vec![BlockMutation::Finalize { id, patch }]
            }
            None => {
                error!(
                    message_id = %self.message_id,
                    "citation completion with no citation block, ignoring"
                );
                Vec::new()
            }
        }
    }

    fn on_image_created(&mut self) -> Vec<BlockMutation> {
        if let Some(id) = self.placeholder.take() {
            self.image = Some(id);
            self.last_block = Some(id);
            return vec![BlockMutation::Write {
                id,
                patch: BlockPatch::status(BlockStatus::Streaming).with_promotion(BlockKind::Image),
            }];
        }
        if self.image.is_some() {
            return Vec::new();
        }
        let block = MessageBlock::new(
            self.message_id,
            BlockPayload::Image {
                url: None,
                metadata: None,
            },
            BlockStatus::Streaming,
        );
        self.image = Some(block.id);
        vec![self.transition(block, BlockKind::Image)]
    }

    fn on_image_delta(&mut self, image: &crate::generation::ImageData) -> Vec<BlockMutation> {
        let Some(id) = self.image else {
            return Vec::new();
        };
        let mut patch = BlockPatch::status(BlockStatus::Streaming);
        patch.image_url = image.images.first().cloned();
        patch.image_metadata = image.metadata.clone();
        vec![BlockMutation::Write { id, patch }]
    }

    fn on_image_generated(
        &mut self,
        image: Option<&crate::generation::ImageData>,
    ) -> Vec<BlockMutation> {
        match self.image.take() {
            Some(id) => {
                let mut patch = BlockPatch::status(BlockStatus::Success);
                if let Some(image) = image {
                    patch.image_url = image.images.first().cloned();
                    patch.image_metadata = image.metadata.clone();
                }
                vec![BlockMutation::Finalize { id, patch }]
            }
            None => {
                error!(
                    message_id = %self.message_id,
                    "image_generated with no image block, ignoring"
                );
                Vec::new()
            }
        }
    }

    fn on_error(&mut self, record: ErrorRecord, aborted: bool) -> Vec<BlockMutation> {
        let block_status = if aborted {
            BlockStatus::Paused
        } else {
            BlockStatus::Error
        };
        let mut out = Vec::new();
        if let Some(id) = self.active_block() {
            self.clear_active(id);
            out.push(BlockMutation::Finalize {
                id,
                patch: BlockPatch::status(block_status),
            });
        }

        // The error itself always becomes a visible block, even when earlier
        // blocks remain intact.
        let block = MessageBlock::new(
            self.message_id,
            BlockPayload::Error { record },
            BlockStatus::Success,
        );
        out.push(self.transition(block, BlockKind::Error));
        out.push(BlockMutation::CloseMessage {
            status: if aborted {
                MessageStatus::Paused
            } else {
                MessageStatus::Error
            },
            usage: None,
        });
        out
    }

    fn on_complete(&mut self, usage: Option<UsageMetrics>) -> Vec<BlockMutation> {
        let mut out = Vec::new();
        let text = std::mem::take(&mut self.accumulated_text);
        let thinking = std::mem::take(&mut self.accumulated_thinking);

        if let Some(id) = self.main_text.take() {
            out.push(BlockMutation::Finalize {
                id,
                patch: BlockPatch::default()
                    .with_content(text)
                    .with_status(BlockStatus::Success),
            });
        }
        if let Some(id) = self.thinking.take() {
            out.push(BlockMutation::Finalize {
                id,
                patch: BlockPatch::default()
                    .with_content(thinking)
                    .with_status(BlockStatus::Success),
            });
        }
        for id in self.drain_open_blocks() {
            out.push(BlockMutation::Finalize {
                id,
                patch: BlockPatch::status(BlockStatus::Success),
            });
        }
        out.push(BlockMutation::CloseMessage {
            status: MessageStatus::Success,
            usage,
        });
        out
    }

    // ── internals ────────────────────────────────────────────────────────────

    /// Register a freshly created block and reset cross-block accumulation.
    fn transition(&mut self, block: MessageBlock, kind: BlockKind) -> BlockMutation {
        if kind != BlockKind::MainText {
            self.accumulated_text.clear();
        }
        if kind != BlockKind::Thinking {
            self.accumulated_thinking.clear();
        }
        self.last_block = Some(block.id);
        BlockMutation::Create(block)
    }

    /// The single block currently in flight, by the same priority order the
    /// stream produces them.
    fn active_block(&self) -> Option<BlockId> {
        self.main_text
            .or(self.thinking)
            .or(self.active_tool)
            .or(self.image)
            .or(self.citation)
            .or(self.placeholder)
            .or(self.last_block)
    }

    fn clear_active(&mut self, id: BlockId) {
        for slot in [
            &mut self.main_text,
            &mut self.thinking,
            &mut self.active_tool,
            &mut self.image,
            &mut self.citation,
            &mut self.placeholder,
        ] {
            if *slot == Some(id) {
                *slot = None;
            }
        }
    }

    /// Take every still-open block id (placeholder, tools, image, citation).
    fn drain_open_blocks(&mut self) -> Vec<BlockId> {
        let mut open = Vec::new();
        open.extend(self.main_text.take());
        open.extend(self.thinking.take());
        open.extend(self.placeholder.take());
        open.extend(self.image.take());
        open.extend(self.citation.take());
        open.extend(self.tool_blocks.drain().map(|(_, id)| id));
        self.active_tool = None;
        let mut seen = std::collections::HashSet::new();
        open.retain(|id| seen.insert(*id));
        open
    }
}
