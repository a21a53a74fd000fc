//! Streaming response assembly pipeline.
//!
//! This crate consumes ordered generation events and materializes them into a
//! persisted conversation record of messages and typed content blocks, while
//! bounding persistence write volume and enforcing per-assistant tool-call
//! policy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ResponseOrchestrator                                        │
//! │  - one FIFO lane per topic, abort registry per message       │
//! │  - explicit bounded retry loop for tool-call enforcement     │
//! └──────────────────────────────────────────────────────────────┘
//!         │               │                │               │
//!         ▼               ▼                ▼               ▼
//!  ┌────────────┐  ┌─────────────┐  ┌────────────┐  ┌───────────┐
//!  │BlockAssem- │  │WriteThrott- │  │ContextCom- │  │ToolCall-  │
//!  │bler        │  │ler          │  │pressor     │  │Enforcer   │
//!  └────────────┘  └─────────────┘  └────────────┘  └───────────┘
//! ```
//!
//! # Core components
//!
//! - [`BlockAssembler`]: per-attempt block state machine
//! - [`WriteThrottler`]: per-block trailing-edge write coalescing
//! - [`ContextCompressor`]: lossy history compression
//! - [`ToolCallEnforcer`]: mandatory tool-call policy with bounded retry
//! - [`ToolPreflight`]: forced baseline tool invocation before generation
//! - [`ResponseOrchestrator`]: ties it all together per conversation

pub mod assembler;
pub mod compress;
pub mod enforce;
pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod preflight;
pub mod queue;
pub mod throttler;

pub use error::{PipelineError, Result};

pub use assembler::{BlockAssembler, BlockMutation};
pub use compress::{
    Compressed, CompressorConfig, ContextCompressor, ContextEntry, KeywordBucket, estimate_tokens,
};
pub use enforce::{AttemptObserver, EnforcerConfig, EnforcerVerdict, ToolCallEnforcer};
pub use generation::{
    EventStream, GenerationError, GenerationEvent, GenerationRequest, GenerationService,
    ImageData, MockGeneration, PromptMessage, ToolEventStatus,
};
pub use orchestrator::{OrchestratorConfig, ResponseOrchestrator};
pub use preflight::{
    MockToolExecutor, PreflightConfig, PreflightOutcome, PreflightSection, ToolDescriptor,
    ToolError, ToolExecutor, ToolPreflight,
};
pub use queue::TopicQueues;
pub use throttler::{DEFAULT_WRITE_WINDOW, WriteThrottler};
