//! Mandatory tool-call policy enforcement.
//!
//! Some assistants must invoke an external tool before answering. The
//! enforcer observes one generation attempt and decides whether to let it
//! finish: if main text accumulates past a threshold with no tool event, the
//! attempt is a violation and the orchestrator cancels and retries with an
//! escalated directive prepended to the user's query, up to a bound. The
//! threshold check is a heuristic, so it is re-applied at stream completion
//! to catch violations only visible once the full response is known.

use std::time::Duration;

use tracing::{debug, warn};

use crate::generation::GenerationEvent;

/// Configuration for the enforcer.
///
/// The text threshold is an approximation of "the model has started
/// answering"; it stays configurable rather than becoming a contract.
#[derive(Debug, Clone)]
pub struct EnforcerConfig {
    /// Accumulated main-text length that marks a violation when no tool call
    /// has been observed.
    pub text_threshold: usize,
    /// Maximum retries before giving up.
    pub max_retries: u32,
    /// Delay before re-attempting after a violation.
    pub retry_delay: Duration,
    /// Context limit forced onto retry attempts, squeezing out history that
    /// lets the model answer from memory.
    pub retry_context_limit: usize,
    /// Escalating directives prepended to the user query, indexed by retry
    /// count (saturating at the last entry).
    pub directives: Vec<String>,
    /// Interim notice shown while a retry is being prepared.
    pub waiting_notice: String,
    /// Final notice written when retries are exhausted.
    pub exhaustion_notice: String,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            text_threshold: 50,
            max_retries: 10,
            retry_delay: Duration::from_secs(2),
            retry_context_limit: 1,
            directives: vec![
                "Please call the tool. ".to_string(),
                "You must call the tool to fetch live data. ".to_string(),
                "Important: you MUST call the available tool! ".to_string(),
                "Warning: do not answer from memory, call the tool! ".to_string(),
                "Mandatory: call the tool for live data immediately! ".to_string(),
            ],
            waiting_notice: "Retrying to fetch live data...".to_string(),
            exhaustion_notice: "**Unable to fetch live data**\n\nAfter repeated attempts the \
                                assistant still did not call a tool for live data. Check the \
                                tool configuration or rephrase the question."
                .to_string(),
        }
    }
}

/// Per-attempt observation state.
#[derive(Debug, Default)]
pub struct AttemptObserver {
    has_tool_call: bool,
    text_len: usize,
}

impl AttemptObserver {
    /// Whether any tool event has been seen this attempt.
    pub fn has_tool_call(&self) -> bool {
        self.has_tool_call
    }

    /// Accumulated main-text length this attempt.
    pub fn text_len(&self) -> usize {
        self.text_len
    }
}

/// Verdict for one observed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcerVerdict {
    /// Keep streaming.
    Proceed,
    /// Cancel the attempt and retry with an escalated directive.
    Violation,
}

/// The mandatory-tool-call policy engine.
#[derive(Debug, Clone, Default)]
pub struct ToolCallEnforcer {
    config: EnforcerConfig,
}

impl ToolCallEnforcer {
    pub fn new(config: EnforcerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    /// Fresh observation state for one attempt.
    pub fn observer(&self) -> AttemptObserver {
        AttemptObserver::default()
    }

    /// Observe one event for a tool-mandatory attempt.
    pub fn observe(
        &self,
        observer: &mut AttemptObserver,
        event: &GenerationEvent,
    ) -> EnforcerVerdict {
        match event {
            GenerationEvent::ToolInProgress { id, tool_name } => {
                debug!(tool_call_id = %id, tool = %tool_name, "tool call observed");
                observer.has_tool_call = true;
            }
            GenerationEvent::ToolComplete { id, .. } => {
                debug!(tool_call_id = %id, "tool completion observed");
                observer.has_tool_call = true;
            }
            GenerationEvent::TextChunk { text } => {
                observer.text_len += text.chars().count();
                if !observer.has_tool_call && observer.text_len > self.config.text_threshold {
                    warn!(
                        text_len = observer.text_len,
                        threshold = self.config.text_threshold,
                        "text accumulating without a tool call"
                    );
                    return EnforcerVerdict::Violation;
                }
            }
            // The mid-stream check can miss a violation that only the full
            // response reveals; re-check at completion.
            GenerationEvent::Complete { .. } => {
                if !observer.has_tool_call {
                    warn!("response completed without a tool call");
                    return EnforcerVerdict::Violation;
                }
            }
            _ => {}
        }
        EnforcerVerdict::Proceed
    }

    /// Whether `retry_count` has reached the retry bound.
    pub fn exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.config.max_retries
    }

    /// The directive for a given retry count, saturating at the last one.
    pub fn directive_for(&self, retry_count: u32) -> &str {
        let index = (retry_count as usize).min(self.config.directives.len().saturating_sub(1));
        self.config
            .directives
            .get(index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Strip any known directive prefixes from a query.
    pub fn strip_directives<'a>(&self, text: &'a str) -> &'a str {
        let mut stripped = text;
        loop {
            let before = stripped;
            for directive in &self.config.directives {
                if let Some(rest) = stripped.strip_prefix(directive.as_str()) {
                    stripped = rest;
                }
            }
            if stripped == before {
                return stripped.trim_start();
            }
        }
    }

    /// Prime a first-attempt query with the mildest directive. Idempotent:
    /// existing directives are stripped first.
    pub fn prime_query(&self, query: &str) -> String {
        self.rewrite_query(query, 0)
    }

    /// Rewrite the user query for a retry: strip old directives, prepend the
    /// one escalated to `retry_count`.
    pub fn rewrite_query(&self, query: &str, retry_count: u32) -> String {
        let base = self.strip_directives(query);
        format!("{}{}", self.directive_for(retry_count), base)
    }
}
