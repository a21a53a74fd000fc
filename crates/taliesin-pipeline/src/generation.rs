//! The generation collaborator: event union, service trait, and test double.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use taliesin_types::{
    ErrorRecord, MessageId, ModelRef, Role, ToolCallId, ToolOutcome, UsageMetrics,
};

/// Error from the generation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Transport or provider failure.
    #[error("generation backend error: {0}")]
    Backend(String),

    /// The scripted mock ran out of responses.
    #[error("no generation script available")]
    Exhausted,
}

impl GenerationError {
    /// Convert into a serializable error record for an Error block.
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord::new("generation_error", self.to_string())
    }
}

/// Completion status reported on a tool-complete event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventStatus {
    Done,
    Error,
}

/// Image payload carried by image events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// Generated image URLs, most relevant first.
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// One event in a generation stream.
///
/// A closed union: the block state machine matches it exhaustively, and new
/// kinds are added here and at every match site, never via a fallthrough arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// The response has been accepted; block assembly may begin.
    Created,
    /// A main-text delta.
    TextChunk { text: String },
    /// Main text finished; carries the final full text.
    TextComplete { text: String },
    /// A reasoning-text delta with monotonically increasing elapsed time.
    ThinkingChunk { text: String, elapsed_ms: u64 },
    /// Reasoning finished.
    ThinkingComplete { text: String, elapsed_ms: u64 },
    /// A tool invocation started, correlated by id.
    ToolInProgress { id: ToolCallId, tool_name: String },
    /// A tool invocation finished.
    ToolComplete {
        id: ToolCallId,
        status: ToolEventStatus,
        response: Option<ToolOutcome>,
    },
    /// An external (host-side) tool lookup started.
    ExternalToolInProgress,
    /// External tool lookup finished with source references.
    ExternalToolComplete { result: serde_json::Value },
    /// Provider-side web search started.
    WebSearchInProgress,
    /// Provider-side web search finished.
    WebSearchComplete { result: serde_json::Value },
    /// Image generation started.
    ImageCreated,
    /// Image refinement step.
    ImageDelta { image: ImageData },
    /// Image generation finished; `None` means the last delta stands.
    ImageGenerated { image: Option<ImageData> },
    /// Terminal failure of the stream.
    Error { record: ErrorRecord },
    /// The response finished normally.
    Complete { usage: Option<UsageMetrics> },
}

/// One message rendered for the generation prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub text: String,
}

impl PromptMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// A request to generate one assistant response.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The assistant message being generated (abort handles key on this).
    pub message_id: MessageId,
    pub model: ModelRef,
    /// Conversation slice, oldest first; the last entry is the triggering
    /// user message.
    pub prompt: Vec<PromptMessage>,
}

/// An ordered stream of generation events.
pub type EventStream =
    Pin<Box<dyn Stream<Item = std::result::Result<GenerationEvent, GenerationError>> + Send>>;

/// The generation collaborator.
///
/// Implementations observe the abort token cooperatively: once cancelled, the
/// stream stops yielding events.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn stream(
        &self,
        request: GenerationRequest,
        abort: CancellationToken,
    ) -> std::result::Result<EventStream, GenerationError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Generation
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted generation service for tests.
///
/// Scripts are consumed in order, one per `stream` call; requests are logged
/// for assertion. An optional per-event delay makes throttle and cancellation
/// timing observable.
pub struct MockGeneration {
    scripts: std::sync::Mutex<Vec<Vec<GenerationEvent>>>,
    request_log: std::sync::Mutex<Vec<GenerationRequest>>,
    event_delay: Option<std::time::Duration>,
}

impl MockGeneration {
    /// Create a mock that plays the given scripts in order.
    pub fn new(scripts: Vec<Vec<GenerationEvent>>) -> Self {
        Self {
            scripts: std::sync::Mutex::new(scripts),
            request_log: std::sync::Mutex::new(Vec::new()),
            event_delay: None,
        }
    }

    /// A mock that streams `text` as a single chunk and completes.
    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(vec![vec![
            GenerationEvent::Created,
            GenerationEvent::TextChunk { text: text.clone() },
            GenerationEvent::TextComplete { text },
            GenerationEvent::Complete { usage: None },
        ]])
    }

    /// Sleep this long before each event.
    pub fn with_event_delay(mut self, delay: std::time::Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }

    /// All requests made so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.request_log.lock().unwrap().clone()
    }

    /// Number of requests made so far.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationService for MockGeneration {
    async fn stream(
        &self,
        request: GenerationRequest,
        abort: CancellationToken,
    ) -> std::result::Result<EventStream, GenerationError> {
        self.request_log.lock().unwrap().push(request);

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                return Err(GenerationError::Exhausted);
            }
            scripts.remove(0)
        };
        let delay = self.event_delay;

        Ok(Box::pin(async_stream::stream! {
            for event in script {
                if abort.is_cancelled() {
                    return;
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if abort.is_cancelled() {
                    return;
                }
                yield Ok(event);
            }
        }))
    }
}
