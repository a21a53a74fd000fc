//! Forced baseline tool invocation before generation.
//!
//! Tool-mandatory assistants answer questions about live data. Rather than
//! hoping the model asks, the pipeline can invoke a baseline set of tools up
//! front (current date, then week number, then keyword-routed data queries)
//! and inject the results into the prompt as a context section. Each
//! invocation is surfaced as a pair of tool events so the conversation
//! record shows the calls like any other tool use.
//!
//! Preflight is best-effort end to end: a failing call is logged, surfaced as
//! an errored tool event, and skipped; an empty result set simply yields no
//! context section.

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use taliesin_types::{AssistantProfile, ToolCallId, ToolInvocation, ToolOutcome, ToolServerRef};

use crate::generation::{GenerationEvent, ToolEventStatus};

/// Error from the tool execution collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool execution failed: {0}")]
    Execution(String),
}

/// A tool advertised by a server.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub server: ToolServerRef,
}

/// The tool execution collaborator.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools advertised by one server.
    async fn list_tools(&self, server: &ToolServerRef) -> Result<Vec<ToolDescriptor>, ToolError>;

    /// Execute a tool.
    async fn invoke(&self, invocation: ToolInvocation) -> Result<ToolOutcome, ToolError>;
}

/// Configuration for the preflight sequence.
#[derive(Debug, Clone)]
pub struct PreflightConfig {
    /// Tool returning the current date as text.
    pub date_tool: String,
    /// Tool mapping a date to a week number.
    pub week_tool: String,
    /// Tool querying table records by week.
    pub records_tool: String,
    /// Fallback tool listing available tables.
    pub table_list_tool: String,
    /// Table queried for plan-related questions.
    pub plan_table: String,
    /// Table queried for task-related questions.
    pub task_table: String,
    /// Query substrings that route to the plan table.
    pub plan_keywords: Vec<String>,
    /// Query substrings that route to the task table.
    pub task_keywords: Vec<String>,
    /// Offset applied to the current week when querying (reporting covers
    /// the week being reviewed, not the running one).
    pub week_offset: i64,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            date_tool: "get_current_date".to_string(),
            week_tool: "get_week_number".to_string(),
            records_tool: "list_table_records".to_string(),
            table_list_tool: "get_table_list".to_string(),
            plan_table: "weekly_work_plan".to_string(),
            task_table: "weekly_meeting_tasks".to_string(),
            plan_keywords: vec![
                "work".to_string(),
                "plan".to_string(),
                "progress".to_string(),
                "deliverable".to_string(),
            ],
            task_keywords: vec![
                "task".to_string(),
                "assigned".to_string(),
                "schedule".to_string(),
                "agenda".to_string(),
            ],
            week_offset: -1,
        }
    }
}

/// One completed preflight invocation.
#[derive(Debug, Clone)]
pub struct PreflightSection {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub outcome: ToolOutcome,
}

/// The collected results of a preflight run.
#[derive(Debug, Clone, Default)]
pub struct PreflightOutcome {
    pub sections: Vec<PreflightSection>,
}

impl PreflightOutcome {
    /// Whether no tool produced data.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Render the collected data as a prompt context section.
    pub fn context_block(&self) -> Option<String> {
        if self.sections.is_empty() {
            return None;
        }
        let mut out = String::from("[TOOL_DATA]\n## Live tool data\n\n");
        for (i, section) in self.sections.iter().enumerate() {
            out.push_str(&format!("### Tool {}: {}\n", i + 1, section.tool_name));
            out.push_str(&format!("Arguments: {}\n", section.arguments));
            out.push_str("Result:\n");
            for content in &section.outcome.content {
                match content {
                    taliesin_types::ToolContent::Text { text } => {
                        out.push_str(text);
                        out.push('\n');
                    }
                    taliesin_types::ToolContent::Json { data } => {
                        out.push_str("```json\n");
                        out.push_str(&data.to_string());
                        out.push_str("\n```\n");
                    }
                }
            }
            out.push_str("\n---\n\n");
        }
        out.push_str("[/TOOL_DATA]\n");
        Some(out)
    }
}

/// Runs the forced baseline tool sequence.
pub struct ToolPreflight {
    executor: std::sync::Arc<dyn ToolExecutor>,
    config: PreflightConfig,
}

impl ToolPreflight {
    pub fn new(executor: std::sync::Arc<dyn ToolExecutor>, config: PreflightConfig) -> Self {
        Self { executor, config }
    }

    /// Run the sequence for one user query.
    ///
    /// Emits tool events through `sink` so the caller can materialize Tool
    /// blocks for each invocation.
    pub async fn run(
        &self,
        profile: &AssistantProfile,
        user_query: &str,
        sink: &mut (dyn FnMut(GenerationEvent) + Send),
    ) -> PreflightOutcome {
        let mut outcome = PreflightOutcome::default();

        let tools = self.available_tools(profile).await;
        if tools.is_empty() {
            warn!(profile = %profile.name, "no tools available for preflight");
            return outcome;
        }

        // Baseline facts first: date, then the week derived from it.
        let date = match self
            .call(&tools, &self.config.date_tool, serde_json::json!({}), sink, &mut outcome)
            .await
        {
            Some(outcome) => outcome.first_text().map(|t| t.trim().to_string()),
            None => None,
        };

        let query_week = match &date {
            Some(date) => self.resolve_query_week(&tools, date, sink, &mut outcome).await,
            None => None,
        };

        // Data queries routed by the question's vocabulary.
        let lower_query = user_query.to_lowercase();
        let mut queried = false;

        if let Some(week) = query_week {
            if self
                .config
                .plan_keywords
                .iter()
                .any(|k| lower_query.contains(k.as_str()))
            {
                debug!("plan query detected");
                let args = serde_json::json!({
                    "table": self.config.plan_table,
                    "filter": { "week": week },
                });
                queried |= self
                    .call(&tools, &self.config.records_tool, args, sink, &mut outcome)
                    .await
                    .is_some();
            }
            if self
                .config
                .task_keywords
                .iter()
                .any(|k| lower_query.contains(k.as_str()))
            {
                debug!("task query detected");
                let args = serde_json::json!({
                    "table": self.config.task_table,
                    "filter": { "week": week },
                });
                queried |= self
                    .call(&tools, &self.config.records_tool, args, sink, &mut outcome)
                    .await
                    .is_some();
            }
        }

        // Nothing specific asked for: surface the table catalog instead.
        if !queried {
            self.call(
                &tools,
                &self.config.table_list_tool,
                serde_json::json!({}),
                sink,
                &mut outcome,
            )
            .await;
        }

        outcome
    }

    async fn available_tools(&self, profile: &AssistantProfile) -> Vec<ToolDescriptor> {
        let mut tools = Vec::new();
        for server in &profile.tool_servers {
            match self.executor.list_tools(server).await {
                Ok(mut server_tools) => tools.append(&mut server_tools),
                Err(e) => {
                    warn!(server = %server.name, error = %e, "failed to list tools");
                }
            }
        }
        tools
    }

    async fn resolve_query_week(
        &self,
        tools: &[ToolDescriptor],
        date: &str,
        sink: &mut (dyn FnMut(GenerationEvent) + Send),
        outcome: &mut PreflightOutcome,
    ) -> Option<i64> {
        let args = serde_json::json!({ "date": date });
        let week = self
            .call(tools, &self.config.week_tool, args, sink, outcome)
            .await?;
        let current: i64 = week.first_text()?.trim().parse().ok()?;
        Some(current + self.config.week_offset)
    }

    /// Invoke one tool by name, emitting progress/completion events. Returns
    /// `None` (after logging and recording the errored event) on any failure.
    async fn call(
        &self,
        tools: &[ToolDescriptor],
        tool_name: &str,
        arguments: serde_json::Value,
        sink: &mut (dyn FnMut(GenerationEvent) + Send),
        outcome: &mut PreflightOutcome,
    ) -> Option<ToolOutcome> {
        let Some(descriptor) = tools.iter().find(|t| t.name == tool_name) else {
            warn!(tool = %tool_name, "tool not advertised, skipping");
            return None;
        };

        let call_id = ToolCallId::new(Uuid::new_v4().to_string());
        sink(GenerationEvent::ToolInProgress {
            id: call_id.clone(),
            tool_name: tool_name.to_string(),
        });

        let invocation = ToolInvocation {
            tool_name: tool_name.to_string(),
            server: descriptor.server.clone(),
            arguments: arguments.clone(),
        };

        match self.executor.invoke(invocation).await {
            Ok(result) => {
                sink(GenerationEvent::ToolComplete {
                    id: call_id,
                    status: if result.is_error {
                        ToolEventStatus::Error
                    } else {
                        ToolEventStatus::Done
                    },
                    response: Some(result.clone()),
                });
                if result.is_error {
                    return None;
                }
                outcome.sections.push(PreflightSection {
                    tool_name: tool_name.to_string(),
                    arguments,
                    outcome: result.clone(),
                });
                Some(result)
            }
            Err(e) => {
                warn!(tool = %tool_name, error = %e, "preflight invocation failed");
                sink(GenerationEvent::ToolComplete {
                    id: call_id,
                    status: ToolEventStatus::Error,
                    response: Some(ToolOutcome::error(e.to_string())),
                });
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Executor
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted tool executor for tests: maps tool names to fixed outcomes and
/// logs every invocation.
#[derive(Default)]
pub struct MockToolExecutor {
    tools: Vec<String>,
    responses: std::sync::Mutex<std::collections::HashMap<String, ToolOutcome>>,
    invocations: std::sync::Mutex<Vec<ToolInvocation>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a tool and fix its response.
    pub fn with_tool(mut self, name: impl Into<String>, outcome: ToolOutcome) -> Self {
        let name = name.into();
        self.tools.push(name.clone());
        self.responses.lock().unwrap().insert(name, outcome);
        self
    }

    /// All invocations made so far.
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn list_tools(&self, server: &ToolServerRef) -> Result<Vec<ToolDescriptor>, ToolError> {
        Ok(self
            .tools
            .iter()
            .map(|name| ToolDescriptor {
                name: name.clone(),
                server: server.clone(),
            })
            .collect())
    }

    async fn invoke(&self, invocation: ToolInvocation) -> Result<ToolOutcome, ToolError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        self.responses
            .lock()
            .unwrap()
            .get(&invocation.tool_name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(invocation.tool_name))
    }
}
