//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when parsing an identifier from a string.
#[derive(Debug, thiserror::Error)]
#[error("invalid identifier: {0}")]
pub struct IdParseError(String);

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Parse from a string representation.
            pub fn parse(s: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| IdParseError(format!("{s}: {e}")))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a conversation topic.
    TopicId
}

uuid_id! {
    /// Unique identifier for a message within a topic.
    MessageId
}

uuid_id! {
    /// Unique identifier for a content block within a message.
    BlockId
}

/// Correlation id linking a tool invocation to its completion event.
///
/// Unlike the UUID-backed ids above, this is assigned by the generation
/// collaborator and treated as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallId(String);

impl ToolCallId {
    /// Wrap a collaborator-assigned id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ToolCallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ToolCallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(TopicId::new(), TopicId::new());
        assert_ne!(MessageId::new(), MessageId::new());
        assert_ne!(BlockId::new(), BlockId::new());
    }

    #[test]
    fn test_id_roundtrip() {
        let id = BlockId::new();
        let parsed = BlockId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_parse_rejects_garbage() {
        assert!(MessageId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_tool_call_id_is_opaque() {
        let id = ToolCallId::from("call_42");
        assert_eq!(id.as_str(), "call_42");
        assert_eq!(id, ToolCallId::new("call_42"));
    }
}
