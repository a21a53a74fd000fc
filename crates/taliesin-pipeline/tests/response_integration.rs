//! End-to-end pipeline tests: scripted generation streams through the
//! orchestrator into the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use taliesin_cache::CacheConfig;
use taliesin_pipeline::{
    EnforcerConfig, GenerationEvent, MockGeneration, MockToolExecutor, OrchestratorConfig,
    ResponseOrchestrator, ToolEventStatus,
};
use taliesin_store::{ConversationStore, MemoryStore, ViewPublisher};
use taliesin_types::{
    AssistantProfile, BlockKind, BlockPayload, BlockStatus, ErrorRecord, Message, MessageBlock,
    MessageId, MessageStatus, ModelRef, ToolCallId, ToolOutcome, ToolServerRef, TopicId,
    UsageMetrics,
};

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        throttle_window: Duration::from_millis(10),
        throttler_cache: CacheConfig::new().without_ttl(),
        enforcer: EnforcerConfig {
            retry_delay: Duration::from_millis(20),
            ..EnforcerConfig::default()
        },
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(
    generation: Arc<MockGeneration>,
    store: Arc<MemoryStore>,
    config: OrchestratorConfig,
) -> ResponseOrchestrator {
    ResponseOrchestrator::new(generation, store, ViewPublisher::default(), config)
}

fn plain_profile() -> AssistantProfile {
    AssistantProfile::new("a1", "Assistant", ModelRef::new("m1", "Model One"))
}

fn user_turn(topic: TopicId, text: &str) -> (Message, Vec<MessageBlock>) {
    let mut message = Message::user(topic);
    let block = MessageBlock::new(
        message.id,
        BlockPayload::MainText {
            content: text.to_string(),
        },
        BlockStatus::Success,
    );
    message.push_block(block.id);
    (message, vec![block])
}

async fn wait_for_terminal(store: &MemoryStore, id: MessageId) -> Message {
    for _ in 0..300 {
        if let Some(message) = store.get_message(id).await.unwrap()
            && message.status.is_terminal()
        {
            return message;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("message {id} never reached a terminal status");
}

fn text_chunks(parts: &[&str]) -> Vec<GenerationEvent> {
    let mut events = vec![GenerationEvent::Created];
    for part in parts {
        events.push(GenerationEvent::TextChunk {
            text: part.to_string(),
        });
    }
    events.push(GenerationEvent::TextComplete {
        text: parts.concat(),
    });
    events.push(GenerationEvent::Complete {
        usage: Some(UsageMetrics::new(20, 10)),
    });
    events
}

#[tokio::test]
async fn test_text_stream_persists_exact_concatenation() {
    let store = Arc::new(MemoryStore::new());
    let generation = Arc::new(MockGeneration::new(vec![text_chunks(&[
        "The ", "answer ", "is ", "42.",
    ])]));
    let orch = orchestrator(generation, store.clone(), fast_config());

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "what is the answer?");
    let ids = orch.send(user, blocks, plain_profile()).await.unwrap();
    assert_eq!(ids.len(), 1);

    let message = wait_for_terminal(&store, ids[0]).await;
    assert_eq!(message.status, MessageStatus::Success);
    assert_eq!(message.usage.map(|u| u.total_tokens), Some(30));

    // The placeholder was reclassified, so exactly one block exists and its
    // content is the in-order concatenation of every chunk.
    assert_eq!(message.block_ids.len(), 1);
    let block = store
        .get_block(message.block_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(block.kind(), BlockKind::MainText);
    assert_eq!(block.status, BlockStatus::Success);
    assert!(matches!(
        block.payload,
        BlockPayload::MainText { content } if content == "The answer is 42."
    ));
}

#[tokio::test]
async fn test_tool_events_build_tool_block() {
    let store = Arc::new(MemoryStore::new());
    let generation = Arc::new(MockGeneration::new(vec![vec![
        GenerationEvent::Created,
        GenerationEvent::ToolInProgress {
            id: ToolCallId::from("t1"),
            tool_name: "lookup".to_string(),
        },
        GenerationEvent::ToolComplete {
            id: ToolCallId::from("t1"),
            status: ToolEventStatus::Done,
            response: Some(ToolOutcome::text("3 rows")),
        },
        GenerationEvent::TextChunk {
            text: "Found 3 rows.".to_string(),
        },
        GenerationEvent::TextComplete {
            text: "Found 3 rows.".to_string(),
        },
        GenerationEvent::Complete { usage: None },
    ]]));
    let orch = orchestrator(generation, store.clone(), fast_config());

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "look it up");
    let ids = orch.send(user, blocks, plain_profile()).await.unwrap();
    let message = wait_for_terminal(&store, ids[0]).await;

    assert_eq!(message.status, MessageStatus::Success);
    // Placeholder became the tool block; text landed in a second block.
    assert_eq!(message.block_ids.len(), 2);

    let tool_block = store
        .get_block(message.block_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tool_block.status, BlockStatus::Success);
    match &tool_block.payload {
        BlockPayload::Tool {
            tool_call_id,
            tool_name,
            response,
        } => {
            assert_eq!(tool_call_id.as_str(), "t1");
            assert_eq!(tool_name, "lookup");
            assert_eq!(response.as_ref().unwrap().first_text(), Some("3 rows"));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_error_mid_stream_yields_error_block_and_error_status() {
    let store = Arc::new(MemoryStore::new());
    let generation = Arc::new(MockGeneration::new(vec![vec![
        GenerationEvent::Created,
        GenerationEvent::TextChunk {
            text: "partial answer".to_string(),
        },
        GenerationEvent::Error {
            record: ErrorRecord::new("ApiError", "upstream failed"),
        },
    ]]));
    let orch = orchestrator(generation, store.clone(), fast_config());

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "hi");
    let ids = orch.send(user, blocks, plain_profile()).await.unwrap();
    let message = wait_for_terminal(&store, ids[0]).await;

    assert_eq!(message.status, MessageStatus::Error);
    assert_eq!(message.block_ids.len(), 2);

    let text_block = store
        .get_block(message.block_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(text_block.status, BlockStatus::Error);

    let error_block = store
        .get_block(message.block_ids[1])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(error_block.kind(), BlockKind::Error);
    match &error_block.payload {
        BlockPayload::Error { record } => assert_eq!(record.message, "upstream failed"),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_cancellation_finalizes_as_paused() {
    let store = Arc::new(MemoryStore::new());
    let generation = Arc::new(
        MockGeneration::new(vec![text_chunks(&["a", "b", "c", "d", "e", "f"])])
            .with_event_delay(Duration::from_millis(30)),
    );
    let orch = orchestrator(generation, store.clone(), fast_config());

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "slow one");
    let ids = orch.send(user, blocks, plain_profile()).await.unwrap();

    // Let a couple of chunks arrive, then abort.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(orch.cancel(ids[0]).await);

    let message = wait_for_terminal(&store, ids[0]).await;
    assert_eq!(message.status, MessageStatus::Paused);
    for block_id in &message.block_ids {
        let block = store.get_block(*block_id).await.unwrap().unwrap();
        assert!(block.status.is_terminal());
    }
}

#[tokio::test]
async fn test_fan_out_creates_sibling_responses() {
    let store = Arc::new(MemoryStore::new());
    let generation = Arc::new(MockGeneration::new(vec![
        text_chunks(&["from model one"]),
        text_chunks(&["from model two"]),
    ]));
    let orch = orchestrator(generation.clone(), store.clone(), fast_config());

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "ask everyone");
    let user_mentions = user.with_mentions(vec![
        ModelRef::new("m1", "Model One"),
        ModelRef::new("m2", "Model Two"),
    ]);
    let user_id = user_mentions.id;

    let ids = orch
        .send(user_mentions, blocks, plain_profile())
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    let first = wait_for_terminal(&store, ids[0]).await;
    let second = wait_for_terminal(&store, ids[1]).await;

    // Siblings answer the same turn with different models.
    assert_eq!(first.ask_id, Some(user_id));
    assert_eq!(second.ask_id, Some(user_id));
    assert_eq!(first.model.as_ref().unwrap().id, "m1");
    assert_eq!(second.model.as_ref().unwrap().id, "m2");
    assert_eq!(generation.request_count(), 2);

    // Same-topic serialization: both live in the same ordered topic list.
    let topic_messages = store.topic_messages(topic).await.unwrap();
    assert_eq!(topic_messages.len(), 3);
}

#[tokio::test]
async fn test_tool_mandatory_violation_retries_with_directive() {
    let store = Arc::new(MemoryStore::new());
    // First attempt: 60 chars of text, no tool call -> violation.
    // Second attempt: tool call then text -> success.
    let generation = Arc::new(MockGeneration::new(vec![
        vec![
            GenerationEvent::Created,
            GenerationEvent::TextChunk {
                text: "x".repeat(60),
            },
        ],
        vec![
            GenerationEvent::Created,
            GenerationEvent::ToolInProgress {
                id: ToolCallId::from("t1"),
                tool_name: "lookup".to_string(),
            },
            GenerationEvent::ToolComplete {
                id: ToolCallId::from("t1"),
                status: ToolEventStatus::Done,
                response: Some(ToolOutcome::text("data")),
            },
            GenerationEvent::TextChunk {
                text: "done".to_string(),
            },
            GenerationEvent::TextComplete {
                text: "done".to_string(),
            },
            GenerationEvent::Complete { usage: None },
        ],
    ]));
    let orch = orchestrator(generation.clone(), store.clone(), fast_config());

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "summarize this week's tasks");
    let user_block_id = blocks[0].id;
    let profile = plain_profile().with_tool_mandatory();
    let ids = orch.send(user, blocks, profile).await.unwrap();

    let message = wait_for_terminal(&store, ids[0]).await;
    assert_eq!(message.status, MessageStatus::Success);
    assert_eq!(generation.request_count(), 2);

    // The user query carries the first directive exactly once.
    let user_block = store.get_block(user_block_id).await.unwrap().unwrap();
    match &user_block.payload {
        BlockPayload::MainText { content } => {
            assert_eq!(
                content,
                "Please call the tool. summarize this week's tasks"
            );
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    // The surviving attempt produced a tool block.
    let has_tool_block = {
        let mut found = false;
        for block_id in &message.block_ids {
            let block = store.get_block(*block_id).await.unwrap().unwrap();
            if block.kind() == BlockKind::Tool {
                found = true;
            }
        }
        found
    };
    assert!(has_tool_block);

    // The violating attempt's retry used a minimal context window.
    let requests = generation.requests();
    assert!(requests[1].prompt.len() <= requests[0].prompt.len());
}

#[tokio::test]
async fn test_tool_mandatory_exhaustion_closes_as_success_with_notice() {
    let store = Arc::new(MemoryStore::new());
    // Every attempt violates; the bound is 2 retries for test speed.
    let violating: Vec<Vec<GenerationEvent>> = (0..4)
        .map(|_| {
            vec![
                GenerationEvent::Created,
                GenerationEvent::TextChunk {
                    text: "y".repeat(80),
                },
            ]
        })
        .collect();
    let generation = Arc::new(MockGeneration::new(violating));

    let config = OrchestratorConfig {
        enforcer: EnforcerConfig {
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            ..EnforcerConfig::default()
        },
        ..fast_config()
    };
    let orch = orchestrator(generation.clone(), store.clone(), config);

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "needs tools");
    let profile = plain_profile().with_tool_mandatory();
    let ids = orch.send(user, blocks, profile).await.unwrap();

    let message = wait_for_terminal(&store, ids[0]).await;
    // Exhaustion closes the message as success so the conversation is not
    // stuck, with an explanatory error-flavored block.
    assert_eq!(message.status, MessageStatus::Success);
    assert_eq!(generation.request_count(), 3); // initial + 2 retries

    assert_eq!(message.block_ids.len(), 1);
    let notice = store
        .get_block(message.block_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.status, BlockStatus::Error);
    match &notice.payload {
        BlockPayload::MainText { content } => {
            assert!(content.contains("Unable to fetch live data"));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_preflight_feeds_tool_blocks_and_satisfies_enforcer() {
    let store = Arc::new(MemoryStore::new());
    // The model streams plain text; without preflight this would violate the
    // tool-mandatory policy. Preflight's forced calls satisfy it.
    let generation = Arc::new(MockGeneration::new(vec![text_chunks(&[
        "Based on the live data: all on track.",
    ])]));
    let executor = Arc::new(
        MockToolExecutor::new()
            .with_tool("get_current_date", ToolOutcome::text("2026-08-06"))
            .with_tool("get_week_number", ToolOutcome::text("32"))
            .with_tool("get_table_list", ToolOutcome::text("plan, tasks")),
    );
    let orch = ResponseOrchestrator::with_tool_executor(
        generation.clone(),
        store.clone(),
        ViewPublisher::default(),
        executor,
        fast_config(),
    );

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "how are things?");
    let profile = plain_profile()
        .with_tool_mandatory()
        .with_tool_server(ToolServerRef::new("s1", "tables"));
    let ids = orch.send(user, blocks, profile).await.unwrap();

    let message = wait_for_terminal(&store, ids[0]).await;
    assert_eq!(message.status, MessageStatus::Success);
    assert_eq!(generation.request_count(), 1);

    // Tool blocks from preflight plus the text block.
    let mut kinds = Vec::new();
    for block_id in &message.block_ids {
        let block = store.get_block(*block_id).await.unwrap().unwrap();
        kinds.push(block.kind());
    }
    assert!(kinds.iter().filter(|k| **k == BlockKind::Tool).count() >= 2);
    assert!(kinds.contains(&BlockKind::MainText));

    // The prompt received the injected tool-data section.
    let request = &generation.requests()[0];
    assert!(request.prompt.iter().any(|p| p.text.contains("[TOOL_DATA]")));
}

#[tokio::test]
async fn test_same_topic_responses_are_serialized() {
    let store = Arc::new(MemoryStore::new());
    let generation = Arc::new(
        MockGeneration::new(vec![
            text_chunks(&["first response"]),
            text_chunks(&["second response"]),
        ])
        .with_event_delay(Duration::from_millis(5)),
    );
    let orch = orchestrator(generation, store.clone(), fast_config());

    let topic = TopicId::new();
    let (user1, blocks1) = user_turn(topic, "first");
    let ids1 = orch.send(user1, blocks1, plain_profile()).await.unwrap();
    let (user2, blocks2) = user_turn(topic, "second");
    let ids2 = orch.send(user2, blocks2, plain_profile()).await.unwrap();

    let first = wait_for_terminal(&store, ids1[0]).await;
    let second = wait_for_terminal(&store, ids2[0]).await;
    assert_eq!(first.status, MessageStatus::Success);
    assert_eq!(second.status, MessageStatus::Success);

    // FIFO lane: the first response finished before the second started, so
    // the topic record interleaves nothing.
    let messages = store.topic_messages(topic).await.unwrap();
    let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
    let first_pos = ids.iter().position(|i| *i == first.id).unwrap();
    let second_pos = ids.iter().position(|i| *i == second.id).unwrap();
    assert!(first_pos < second_pos);
}

#[tokio::test]
async fn test_regenerate_resets_and_replays() {
    let store = Arc::new(MemoryStore::new());
    let generation = Arc::new(MockGeneration::new(vec![
        text_chunks(&["first draft"]),
        text_chunks(&["second draft"]),
    ]));
    let orch = orchestrator(generation, store.clone(), fast_config());

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "draft it");
    let ids = orch.send(user, blocks, plain_profile()).await.unwrap();
    let message = wait_for_terminal(&store, ids[0]).await;
    let old_blocks = message.block_ids.clone();

    orch.regenerate(ids[0], plain_profile()).await.unwrap();
    // Wait for the regenerated terminal state with fresh content.
    let mut regenerated = None;
    for _ in 0..300 {
        let current = store.get_message(ids[0]).await.unwrap().unwrap();
        if current.status.is_terminal() && current.block_ids != old_blocks {
            regenerated = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let regenerated = regenerated.expect("regeneration never completed");

    // Old blocks were deleted from the store.
    for old in &old_blocks {
        assert!(store.get_block(*old).await.unwrap().is_none());
    }
    let block = store
        .get_block(regenerated.block_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        block.payload,
        BlockPayload::MainText { content } if content == "second draft"
    ));
}

#[tokio::test]
async fn test_send_rejects_empty_user_message() {
    let store = Arc::new(MemoryStore::new());
    let generation = Arc::new(MockGeneration::new(vec![]));
    let orch = orchestrator(generation, store.clone(), fast_config());

    let user = Message::user(TopicId::new());
    let result = orch.send(user, Vec::new(), plain_profile()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_delete_message_group_removes_siblings() {
    let store = Arc::new(MemoryStore::new());
    let generation = Arc::new(MockGeneration::new(vec![
        text_chunks(&["one"]),
        text_chunks(&["two"]),
    ]));
    let orch = orchestrator(generation, store.clone(), fast_config());

    let topic = TopicId::new();
    let (user, blocks) = user_turn(topic, "ask both");
    let user_mentions =
        user.with_mentions(vec![ModelRef::new("m1", "M1"), ModelRef::new("m2", "M2")]);
    let user_id = user_mentions.id;
    let ids = orch
        .send(user_mentions, blocks, plain_profile())
        .await
        .unwrap();
    for id in &ids {
        wait_for_terminal(&store, *id).await;
    }

    let removed = orch.delete_message_group(topic, user_id).await.unwrap();
    assert_eq!(removed, 2);

    let remaining = store.topic_messages(topic).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, user_id);
}
