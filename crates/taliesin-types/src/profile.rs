//! Assistant profiles: per-assistant configuration driving the pipeline.

use serde::{Deserialize, Serialize};

use crate::message::ModelRef;
use crate::tool::ToolServerRef;

/// Configuration of one assistant.
///
/// `tool_mandatory` activates the tool-call enforcer for this assistant's
/// responses; `compress_context` activates history compression before
/// generation; `context_limit` bounds how many prior messages are handed to
/// the generation collaborator (the enforcer forces this to a minimum on
/// retries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantProfile {
    pub id: String,
    pub name: String,
    pub model: ModelRef,
    #[serde(default)]
    pub tool_mandatory: bool,
    #[serde(default)]
    pub compress_context: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_servers: Vec<ToolServerRef>,
}

impl AssistantProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, model: ModelRef) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model,
            tool_mandatory: false,
            compress_context: false,
            context_limit: None,
            tool_servers: Vec::new(),
        }
    }

    /// Require at least one tool invocation per response.
    pub fn with_tool_mandatory(mut self) -> Self {
        self.tool_mandatory = true;
        self
    }

    /// Enable context compression before generation.
    pub fn with_compression(mut self) -> Self {
        self.compress_context = true;
        self
    }

    /// Bound the history slice handed to generation.
    pub fn with_context_limit(mut self, limit: usize) -> Self {
        self.context_limit = Some(limit);
        self
    }

    /// Register a tool server.
    pub fn with_tool_server(mut self, server: ToolServerRef) -> Self {
        self.tool_servers.push(server);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_builder() {
        let profile = AssistantProfile::new("a1", "Office Assistant", ModelRef::new("m1", "M1"))
            .with_tool_mandatory()
            .with_compression()
            .with_context_limit(20)
            .with_tool_server(ToolServerRef::new("s1", "tables"));

        assert!(profile.tool_mandatory);
        assert!(profile.compress_context);
        assert_eq!(profile.context_limit, Some(20));
        assert_eq!(profile.tool_servers.len(), 1);
    }

    #[test]
    fn test_profile_defaults_off() {
        let profile = AssistantProfile::new("a1", "Plain", ModelRef::new("m1", "M1"));
        assert!(!profile.tool_mandatory);
        assert!(!profile.compress_context);
        assert!(profile.context_limit.is_none());
    }
}
