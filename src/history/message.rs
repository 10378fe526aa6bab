//! Message data model: one turn in a conversation, made of typed content
//! parts, plus the metadata that carries history ordering and compaction
//! markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Lifecycle of a tool invocation embedded in an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputRedacted,
}

impl ToolCallState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InputStreaming => "input-streaming",
            Self::InputAvailable => "input-available",
            Self::OutputAvailable => "output-available",
            Self::OutputRedacted => "output-redacted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        text: String,
    },
    /// Model-internal deliberation. Kept in history, dropped from exports by
    /// default.
    Reasoning {
        text: String,
    },
    DynamicTool {
        tool_name: String,
        state: ToolCallState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nested_calls: Option<Vec<Part>>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Monotonic integer assigned at append time, unique within a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub compaction_boundary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction_epoch: Option<i64>,
    /// Who triggered compaction (e.g. `"user"`). Stored as a raw JSON value:
    /// history read back from disk can carry corrupt markers, and the
    /// resolver must be able to see and skip them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compacted: Option<serde_json::Value>,
}

impl MessageMetadata {
    /// Well-formed trigger: a non-empty JSON string. Numbers, objects,
    /// booleans, and empty strings are corrupt markers.
    fn compacted_is_well_formed(&self) -> bool {
        self.compacted
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts,
            metadata: MessageMetadata::default(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::Text { text: text.into() }])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![Part::Text { text: text.into() }])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::Text { text: text.into() }])
    }

    /// Build a durable compaction summary: an assistant message that is a
    /// self-contained replacement for everything before it.
    pub fn compaction_summary(
        summary: impl Into<String>,
        epoch: i64,
        trigger: impl Into<String>,
    ) -> Self {
        let mut message = Self::assistant(summary);
        message.metadata.compaction_boundary = true;
        message.metadata.compaction_epoch = Some(epoch);
        message.metadata.compacted = Some(serde_json::Value::String(trigger.into()));
        message
    }

    /// Full durable-boundary predicate. A message that merely resembles a
    /// boundary (wrong role, missing or non-positive epoch, malformed
    /// trigger) is not durable.
    pub fn is_durable_compaction_boundary(&self) -> bool {
        self.role == Role::Assistant
            && self.metadata.compaction_boundary
            && self.metadata.compaction_epoch.is_some_and(|epoch| epoch > 0)
            && self.metadata.compacted_is_well_formed()
    }

    /// Concatenated visible text of the message (text parts only).
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
