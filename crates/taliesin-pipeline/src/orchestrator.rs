//! The response orchestrator: per-topic coordination of the whole pipeline.
//!
//! One orchestrator owns the event dispatch loop, a FIFO lane per topic, the
//! abort registry, and the wiring between the block state machine, the write
//! throttler, the compressor, the enforcer, and the collaborators. The
//! enforcer's retry loop is an explicit value-carrying loop: each attempt
//! gets `{retry_count, original_query, profile}` as plain state rather than
//! captured mutables.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use taliesin_cache::CacheConfig;
use taliesin_store::{BlockPatch, ConversationStore, ViewEvent, ViewPublisher};
use taliesin_types::{
    AssistantProfile, BlockPayload, BlockStatus, Message, MessageBlock, MessageId, MessageStatus,
    Role, TopicId,
};

use crate::assembler::{BlockAssembler, BlockMutation};
use crate::compress::{Compressed, CompressorConfig, ContextCompressor, ContextEntry};
use crate::enforce::{EnforcerConfig, EnforcerVerdict, ToolCallEnforcer};
use crate::error::{PipelineError, Result};
use crate::generation::{GenerationEvent, GenerationRequest, GenerationService, PromptMessage};
use crate::preflight::{PreflightConfig, ToolExecutor, ToolPreflight};
use crate::queue::TopicQueues;
use crate::throttler::{DEFAULT_WRITE_WINDOW, WriteThrottler};

/// Configuration for the orchestrator and the components it owns.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Coalescing window for block persistence.
    pub throttle_window: Duration,
    /// Bounds on the throttle-entry cache.
    pub throttler_cache: CacheConfig,
    pub enforcer: EnforcerConfig,
    pub compressor: CompressorConfig,
    pub preflight: PreflightConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            throttle_window: DEFAULT_WRITE_WINDOW,
            throttler_cache: CacheConfig::default(),
            enforcer: EnforcerConfig::default(),
            compressor: CompressorConfig::default(),
            preflight: PreflightConfig::default(),
        }
    }
}

enum AttemptOutcome {
    /// The attempt reached a terminal message state (success, error, paused).
    Done,
    /// The enforcer cancelled the attempt; retry with an escalated directive.
    Violation,
}

struct Inner {
    generation: Arc<dyn GenerationService>,
    store: Arc<dyn ConversationStore>,
    view: ViewPublisher,
    throttler: WriteThrottler,
    compressor: ContextCompressor,
    enforcer: ToolCallEnforcer,
    preflight: Option<ToolPreflight>,
    queues: TopicQueues,
    aborts: parking_lot::Mutex<HashMap<MessageId, CancellationToken>>,
    retry_delay: Duration,
    retry_context_limit: usize,
}

/// Top-level per-conversation coordinator.
#[derive(Clone)]
pub struct ResponseOrchestrator {
    inner: Arc<Inner>,
}

impl ResponseOrchestrator {
    /// Create an orchestrator without a tool executor; preflight is skipped
    /// even for tool-mandatory assistants.
    pub fn new(
        generation: Arc<dyn GenerationService>,
        store: Arc<dyn ConversationStore>,
        view: ViewPublisher,
        config: OrchestratorConfig,
    ) -> Self {
        Self::build(generation, store, view, None, config)
    }

    /// Create an orchestrator with a tool executor, enabling forced preflight
    /// invocation for tool-mandatory assistants.
    pub fn with_tool_executor(
        generation: Arc<dyn GenerationService>,
        store: Arc<dyn ConversationStore>,
        view: ViewPublisher,
        executor: Arc<dyn ToolExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self::build(generation, store, view, Some(executor), config)
    }

    fn build(
        generation: Arc<dyn GenerationService>,
        store: Arc<dyn ConversationStore>,
        view: ViewPublisher,
        executor: Option<Arc<dyn ToolExecutor>>,
        config: OrchestratorConfig,
    ) -> Self {
        let throttler = WriteThrottler::new(
            Arc::clone(&store),
            view.clone(),
            config.throttler_cache.clone(),
            config.throttle_window,
        );
        let preflight =
            executor.map(|executor| ToolPreflight::new(executor, config.preflight.clone()));
        let retry_delay = config.enforcer.retry_delay;
        let retry_context_limit = config.enforcer.retry_context_limit;
        Self {
            inner: Arc::new(Inner {
                generation,
                store,
                view,
                throttler,
                compressor: ContextCompressor::new(config.compressor),
                enforcer: ToolCallEnforcer::new(config.enforcer),
                preflight,
                queues: TopicQueues::new(),
                aborts: parking_lot::Mutex::new(HashMap::new()),
                retry_delay,
                retry_context_limit,
            }),
        }
    }

    /// The view feed this orchestrator publishes to.
    pub fn view(&self) -> &ViewPublisher {
        &self.inner.view
    }

    // ── public operations ────────────────────────────────────────────────────

    /// Persist a user turn and queue assistant responses for it.
    ///
    /// Returns the ids of the assistant messages created: one per mentioned
    /// model (fan-out), or a single one for the profile's own model.
    pub async fn send(
        &self,
        user_message: Message,
        user_blocks: Vec<MessageBlock>,
        profile: AssistantProfile,
    ) -> Result<Vec<MessageId>> {
        if user_blocks.is_empty() {
            return Err(PipelineError::EmptyMessage);
        }
        let topic_id = user_message.topic_id;

        self.inner
            .store
            .save_message_with_blocks(&user_message, &user_blocks)
            .await?;
        self.inner
            .view
            .publish(ViewEvent::MessageUpserted(user_message.clone()));
        for block in &user_blocks {
            self.inner
                .view
                .publish(ViewEvent::BlockUpserted(block.clone()));
        }

        let original_query = rendered_text(&user_blocks);

        // Tool-mandatory assistants get the mildest directive up front; the
        // rewrite is idempotent so retries never stack prefixes.
        if profile.tool_mandatory
            && let Some(first) = user_message.block_ids.first()
        {
            let primed = self.inner.enforcer.prime_query(&original_query);
            if primed != original_query {
                let patch = BlockPatch::default()
                    .with_content(primed)
                    .with_status(BlockStatus::Success);
                self.inner.view.publish(ViewEvent::BlockUpdated {
                    id: *first,
                    patch: patch.clone(),
                });
                self.inner.store.update_block(*first, &patch).await?;
            }
        }

        let mut targets = Vec::new();
        if user_message.mentions.is_empty() {
            targets.push(profile.clone());
        } else {
            for mention in &user_message.mentions {
                let mut fan_profile = profile.clone();
                fan_profile.model = mention.clone();
                targets.push(fan_profile);
            }
        }

        let mut ids = Vec::new();
        for target in targets {
            let stub =
                Message::assistant(topic_id, user_message.id).with_model(target.model.clone());
            self.inner.store.save_message_with_blocks(&stub, &[]).await?;
            self.inner
                .view
                .publish(ViewEvent::MessageUpserted(stub.clone()));
            ids.push(stub.id);
            self.enqueue_attempts(topic_id, stub.id, target, original_query.clone())
                .await;
        }
        Ok(ids)
    }

    /// Re-run every assistant response answering the given user message,
    /// creating one if none exists yet.
    pub async fn resend(
        &self,
        user_message_id: MessageId,
        profile: AssistantProfile,
    ) -> Result<Vec<MessageId>> {
        let user = self
            .inner
            .store
            .get_message(user_message_id)
            .await?
            .ok_or(PipelineError::MessageNotFound(user_message_id))?;
        let topic_id = user.topic_id;
        let original_query = self.render_message_text(&user).await?;

        let responses: Vec<Message> = self
            .inner
            .store
            .topic_messages(topic_id)
            .await?
            .into_iter()
            .filter(|m| m.ask_id == Some(user_message_id))
            .collect();

        let mut ids = Vec::new();
        if responses.is_empty() {
            let stub = Message::assistant(topic_id, user_message_id)
                .with_model(profile.model.clone());
            self.inner.store.save_message_with_blocks(&stub, &[]).await?;
            self.inner
                .view
                .publish(ViewEvent::MessageUpserted(stub.clone()));
            ids.push(stub.id);
            self.enqueue_attempts(topic_id, stub.id, profile, original_query)
                .await;
        } else {
            for response in responses {
                self.reset_message(response.id).await?;
                ids.push(response.id);
                self.enqueue_attempts(
                    topic_id,
                    response.id,
                    profile.clone(),
                    original_query.clone(),
                )
                .await;
            }
        }
        Ok(ids)
    }

    /// Discard one assistant response's blocks and generate it again.
    pub async fn regenerate(
        &self,
        assistant_message_id: MessageId,
        profile: AssistantProfile,
    ) -> Result<()> {
        let message = self
            .inner
            .store
            .get_message(assistant_message_id)
            .await?
            .ok_or(PipelineError::MessageNotFound(assistant_message_id))?;
        let ask_id = message
            .ask_id
            .ok_or(PipelineError::MissingAskId(assistant_message_id))?;
        let ask = self
            .inner
            .store
            .get_message(ask_id)
            .await?
            .ok_or(PipelineError::MessageNotFound(ask_id))?;
        let original_query = self.render_message_text(&ask).await?;

        self.reset_message(assistant_message_id).await?;
        self.enqueue_attempts(message.topic_id, assistant_message_id, profile, original_query)
            .await;
        Ok(())
    }

    /// Abort an in-flight response. The terminal state becomes `Paused`, not
    /// `Error`. Returns false if nothing was in flight for the id.
    pub async fn cancel(&self, assistant_message_id: MessageId) -> bool {
        let token = self.inner.aborts.lock().get(&assistant_message_id).cloned();
        match token {
            Some(token) => {
                info!(message_id = %assistant_message_id, "cancelling response");
                token.cancel();
                true
            }
            None => false,
        }
    }

    // ── conversation maintenance ─────────────────────────────────────────────

    /// Hydrate the view feed with a topic's persisted messages and blocks.
    pub async fn load_topic(&self, topic_id: TopicId) -> Result<Vec<Message>> {
        let messages = self.inner.store.topic_messages(topic_id).await?;
        for message in &messages {
            self.inner
                .view
                .publish(ViewEvent::MessageUpserted(message.clone()));
            for block_id in &message.block_ids {
                if let Some(block) = self.inner.store.get_block(*block_id).await? {
                    self.inner.view.publish(ViewEvent::BlockUpserted(block));
                }
            }
        }
        Ok(messages)
    }

    /// Delete one message and its blocks.
    pub async fn delete_message(&self, message_id: MessageId) -> Result<()> {
        let removed = self.inner.store.delete_message(message_id).await?;
        self.inner.throttler.cancel_many(&removed).await;
        self.inner.view.publish(ViewEvent::BlocksRemoved(removed));
        self.inner
            .view
            .publish(ViewEvent::MessageRemoved(message_id));
        Ok(())
    }

    /// Delete every assistant response answering one user message.
    pub async fn delete_message_group(
        &self,
        topic_id: TopicId,
        ask_id: MessageId,
    ) -> Result<usize> {
        let responses: Vec<MessageId> = self
            .inner
            .store
            .topic_messages(topic_id)
            .await?
            .into_iter()
            .filter(|m| m.ask_id == Some(ask_id))
            .map(|m| m.id)
            .collect();
        let count = responses.len();
        for id in responses {
            self.delete_message(id).await?;
        }
        Ok(count)
    }

    /// Remove every message and block of a topic.
    pub async fn clear_topic(&self, topic_id: TopicId) -> Result<()> {
        let messages = self.inner.store.topic_messages(topic_id).await?;
        for message in &messages {
            self.inner.throttler.cancel_many(&message.block_ids).await;
        }
        self.inner.store.clear_topic(topic_id).await?;
        self.inner.view.publish(ViewEvent::TopicCleared(topic_id));
        Ok(())
    }

    // ── attempt loop ─────────────────────────────────────────────────────────

    async fn enqueue_attempts(
        &self,
        topic_id: TopicId,
        assistant_id: MessageId,
        profile: AssistantProfile,
        original_query: String,
    ) {
        let this = self.clone();
        self.inner
            .queues
            .enqueue(topic_id, async move {
                this.run_attempt_loop(topic_id, assistant_id, profile, original_query)
                    .await;
            })
            .await;
    }

    /// The bounded retry loop. Attempt state is explicit: the retry count,
    /// the original (directive-free) query, and the per-attempt profile.
    async fn run_attempt_loop(
        &self,
        topic_id: TopicId,
        assistant_id: MessageId,
        mut profile: AssistantProfile,
        original_query: String,
    ) {
        let mut retry_count: u32 = 0;
        loop {
            let outcome = self
                .run_attempt(topic_id, assistant_id, &profile, retry_count)
                .await;
            match outcome {
                Ok(AttemptOutcome::Done) => break,
                Ok(AttemptOutcome::Violation) => {
                    if self.inner.enforcer.exhausted(retry_count) {
                        warn!(
                            message_id = %assistant_id,
                            retry_count,
                            "tool-call retries exhausted"
                        );
                        if let Err(e) = self.finalize_exhausted(assistant_id).await {
                            error!(message_id = %assistant_id, error = %e, "failed to finalize exhausted message");
                        }
                        break;
                    }

                    info!(
                        message_id = %assistant_id,
                        retry = retry_count + 1,
                        "retrying with escalated directive"
                    );
                    if let Err(e) = self
                        .prepare_retry(assistant_id, &original_query, retry_count)
                        .await
                    {
                        error!(message_id = %assistant_id, error = %e, "retry preparation failed");
                        break;
                    }
                    tokio::time::sleep(self.inner.retry_delay).await;
                    retry_count += 1;
                    // Squeeze history out of the retry so the model cannot
                    // answer from memory.
                    profile.context_limit = Some(self.inner.retry_context_limit);
                }
                Err(e) => {
                    error!(message_id = %assistant_id, error = %e, "attempt failed");
                    break;
                }
            }
        }
        self.inner.aborts.lock().remove(&assistant_id);
    }

    /// One generation attempt: build context, open the stream, dispatch
    /// events through the enforcer and the block state machine.
    async fn run_attempt(
        &self,
        topic_id: TopicId,
        assistant_id: MessageId,
        profile: &AssistantProfile,
        retry_count: u32,
    ) -> Result<AttemptOutcome> {
        let token = CancellationToken::new();
        self.inner
            .aborts
            .lock()
            .insert(assistant_id, token.clone());

        let mut message = self
            .inner
            .store
            .get_message(assistant_id)
            .await?
            .ok_or(PipelineError::MessageNotFound(assistant_id))?;
        let ask_id = message
            .ask_id
            .ok_or(PipelineError::MissingAskId(assistant_id))?;

        debug!(
            message_id = %assistant_id,
            retry_count,
            model = %profile.model.id,
            "starting generation attempt"
        );
        message.status = MessageStatus::Streaming;
        self.inner.store.upsert_message(&message).await?;
        self.inner
            .view
            .publish(ViewEvent::MessageUpserted(message.clone()));

        let entries = self.build_context(topic_id, ask_id, assistant_id, profile).await?;

        let mut assembler = BlockAssembler::new(assistant_id);
        let mut observer = self.inner.enforcer.observer();
        let mut prompt: Vec<PromptMessage> = entries
            .iter()
            .map(|e| PromptMessage::new(e.message.role, e.text.clone()))
            .collect();

        // Forced baseline tool calls: their events run through the same
        // observer and state machine, so the record shows them and the
        // enforcer sees them.
        if profile.tool_mandatory
            && let Some(preflight) = &self.inner.preflight
        {
            let query_text = entries.last().map(|e| e.text.clone()).unwrap_or_default();
            let mut events = Vec::new();
            let outcome = preflight
                .run(profile, &query_text, &mut |e| events.push(e))
                .await;
            for event in &events {
                let _ = self.inner.enforcer.observe(&mut observer, event);
                let mutations = assembler.apply(event, false);
                self.route(&mut message, mutations).await?;
            }
            if let Some(context) = outcome.context_block() {
                let at = prompt.len().saturating_sub(1);
                prompt.insert(at, PromptMessage::new(Role::User, context));
            }
        }

        let request = GenerationRequest {
            message_id: assistant_id,
            model: profile.model.clone(),
            prompt,
        };
        let mut stream = match self.inner.generation.stream(request, token.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                let mutations = assembler.apply(
                    &GenerationEvent::Error {
                        record: e.to_record(),
                    },
                    token.is_cancelled(),
                );
                self.route(&mut message, mutations).await?;
                return Ok(AttemptOutcome::Done);
            }
        };

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    let mutations = assembler.apply(
                        &GenerationEvent::Error {
                            record: e.to_record(),
                        },
                        token.is_cancelled(),
                    );
                    self.route(&mut message, mutations).await?;
                    return Ok(AttemptOutcome::Done);
                }
            };

            if profile.tool_mandatory
                && self.inner.enforcer.observe(&mut observer, &event)
                    == EnforcerVerdict::Violation
            {
                // Cancel the in-flight stream and hand control back to the
                // retry loop before the message can finalize.
                token.cancel();
                if let Some(id) = assembler.active_text_block() {
                    self.inner.view.publish(ViewEvent::BlockUpdated {
                        id,
                        patch: BlockPatch::default()
                            .with_content(self.inner.enforcer.config().waiting_notice.clone())
                            .with_status(BlockStatus::Processing),
                    });
                }
                return Ok(AttemptOutcome::Violation);
            }

            let terminal = matches!(
                event,
                GenerationEvent::Error { .. } | GenerationEvent::Complete { .. }
            );
            let mutations = assembler.apply(&event, token.is_cancelled());
            self.route(&mut message, mutations).await?;
            if terminal {
                return Ok(AttemptOutcome::Done);
            }
        }

        // The stream ended without a terminal event: either a cooperative
        // abort or a collaborator that hung up early.
        if token.is_cancelled() {
            let mutations = assembler.finalize_cancelled();
            self.route(&mut message, mutations).await?;
        } else {
            warn!(message_id = %assistant_id, "stream ended without terminal event");
            let mutations = assembler.apply(&GenerationEvent::Complete { usage: None }, false);
            self.route(&mut message, mutations).await?;
        }
        Ok(AttemptOutcome::Done)
    }

    /// Build the context slice for an attempt: everything up to and including
    /// the triggering user message, minus still-active messages, bounded by
    /// the profile's context limit, optionally compressed.
    async fn build_context(
        &self,
        topic_id: TopicId,
        ask_id: MessageId,
        assistant_id: MessageId,
        profile: &AssistantProfile,
    ) -> Result<Vec<ContextEntry>> {
        let all = self.inner.store.topic_messages(topic_id).await?;
        let slice: Vec<Message> = match all.iter().position(|m| m.id == ask_id) {
            Some(index) => all[..=index].to_vec(),
            None => {
                warn!(
                    message_id = %assistant_id,
                    ask_id = %ask_id,
                    "triggering message not found, falling back to prefix"
                );
                all.into_iter()
                    .take_while(|m| m.id != assistant_id)
                    .collect()
            }
        };

        let mut slice: Vec<Message> = slice.into_iter().filter(|m| !m.is_active()).collect();
        if let Some(limit) = profile.context_limit {
            let skip = slice.len().saturating_sub(limit.max(1));
            slice.drain(..skip);
        }

        let mut entries = Vec::with_capacity(slice.len());
        for message in slice {
            let text = self.render_message_text(&message).await?;
            entries.push(ContextEntry::new(message, text));
        }

        if profile.compress_context {
            let Compressed {
                entries: compressed,
                summary_block,
            } = self.inner.compressor.compress(entries);
            if let Some(block) = summary_block {
                // The digest is visible to the presentation layer but is
                // never persisted.
                self.inner.view.publish(ViewEvent::BlockUpserted(block));
            }
            return Ok(compressed);
        }
        Ok(entries)
    }

    /// Route state-machine mutations to the throttler, store, and view.
    async fn route(&self, message: &mut Message, mutations: Vec<BlockMutation>) -> Result<()> {
        for mutation in mutations {
            match mutation {
                BlockMutation::Create(block) => {
                    message.push_block(block.id);
                    self.inner
                        .store
                        .save_message_with_blocks(message, std::slice::from_ref(&block))
                        .await?;
                    self.inner.view.publish(ViewEvent::BlockUpserted(block));
                    self.inner
                        .view
                        .publish(ViewEvent::MessageUpserted(message.clone()));
                }
                BlockMutation::Write { id, patch } => {
                    self.inner.view.publish(ViewEvent::BlockUpdated {
                        id,
                        patch: patch.clone(),
                    });
                    self.inner.store.update_block(id, &patch).await?;
                }
                BlockMutation::Throttled { id, patch } => {
                    self.inner.throttler.schedule(id, patch).await;
                }
                BlockMutation::Finalize { id, patch } => {
                    self.inner.throttler.flush(id, patch).await?;
                }
                BlockMutation::CloseMessage { status, usage } => {
                    message.status = status;
                    if usage.is_some() {
                        message.usage = usage;
                    }
                    message.updated_at = chrono::Utc::now();
                    self.inner.store.upsert_message(message).await?;
                    self.inner
                        .view
                        .publish(ViewEvent::MessageUpserted(message.clone()));
                }
            }
        }
        Ok(())
    }

    /// Reset an assistant message: cancel pending writes, discard blocks,
    /// return it to pending.
    async fn reset_message(&self, assistant_id: MessageId) -> Result<Message> {
        let mut message = self
            .inner
            .store
            .get_message(assistant_id)
            .await?
            .ok_or(PipelineError::MessageNotFound(assistant_id))?;
        let blocks = message.block_ids.clone();
        self.inner.throttler.cancel_many(&blocks).await;
        self.inner.store.delete_blocks(&blocks).await?;
        message.reset();
        self.inner.store.upsert_message(&message).await?;
        self.inner.view.publish(ViewEvent::BlocksRemoved(blocks));
        self.inner
            .view
            .publish(ViewEvent::MessageUpserted(message.clone()));
        Ok(message)
    }

    /// Rewrite the triggering user message with the directive escalated to
    /// this retry, and reset the assistant message for the next attempt.
    async fn prepare_retry(
        &self,
        assistant_id: MessageId,
        original_query: &str,
        retry_count: u32,
    ) -> Result<()> {
        let message = self.reset_message(assistant_id).await?;
        let ask_id = message
            .ask_id
            .ok_or(PipelineError::MissingAskId(assistant_id))?;
        let ask = self
            .inner
            .store
            .get_message(ask_id)
            .await?
            .ok_or(PipelineError::MessageNotFound(ask_id))?;

        if let Some(first) = ask.block_ids.first() {
            let rewritten = self.inner.enforcer.rewrite_query(original_query, retry_count);
            debug!(ask_id = %ask_id, retry_count, "rewriting user query with directive");
            let patch = BlockPatch::default()
                .with_content(rewritten)
                .with_status(BlockStatus::Success);
            self.inner.view.publish(ViewEvent::BlockUpdated {
                id: *first,
                patch: patch.clone(),
            });
            self.inner.store.update_block(*first, &patch).await?;
        }
        Ok(())
    }

    /// Retries exhausted: leave the conversation unstuck. The explanation is
    /// an error-flavored block, but the message closes as success.
    async fn finalize_exhausted(&self, assistant_id: MessageId) -> Result<()> {
        let mut message = self.reset_message(assistant_id).await?;
        let notice = self.inner.enforcer.config().exhaustion_notice.clone();
        let block = MessageBlock::new(
            assistant_id,
            BlockPayload::MainText { content: notice },
            BlockStatus::Error,
        );
        message.push_block(block.id);
        message.status = MessageStatus::Success;
        self.inner
            .store
            .save_message_with_blocks(&message, std::slice::from_ref(&block))
            .await?;
        self.inner.view.publish(ViewEvent::BlockUpserted(block));
        self.inner
            .view
            .publish(ViewEvent::MessageUpserted(message));
        Ok(())
    }

    /// Concatenated main-text content of a message's blocks.
    async fn render_message_text(&self, message: &Message) -> Result<String> {
        let mut parts = Vec::new();
        for block_id in &message.block_ids {
            if let Some(block) = self.inner.store.get_block(*block_id).await?
                && let BlockPayload::MainText { content } = &block.payload
            {
                parts.push(content.clone());
            }
        }
        Ok(parts.join("\n"))
    }
}

/// Concatenated main-text content of a block list.
fn rendered_text(blocks: &[MessageBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match &b.payload {
            BlockPayload::MainText { content } => Some(content.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
