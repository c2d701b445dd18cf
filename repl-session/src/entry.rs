//! Journal entry types and their JSONL wire shape.

use chrono::{DateTime, Utc};
use repl_types::{Role, TokenUsage, ToolCall};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ISO-8601 timestamps with fixed millisecond precision on the wire.
mod timestamp_ms {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}

/// What kind of event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// A user utterance.
    User,
    /// An assistant completion.
    Assistant,
    /// A shell command (e.g. `clear`, `resume`).
    Command,
    /// A tool invocation and its result preview.
    ToolUse,
    /// A surfaced error.
    Error,
}

/// The conversational payload of a `user`/`assistant` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMessage {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// Optional accounting and tool detail attached to an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Total tokens reported for the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    /// Estimated cost in dollars, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Wall-clock duration of the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Tool name for `tool_use` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Tool arguments for `tool_use` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    /// Truncated tool result for `tool_use` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_preview: Option<String>,
    /// Error description for `error` entries and failed tool uses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntryMetadata {
    /// Whether every field is absent (the wire omits empty metadata).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == EntryMetadata::default()
    }
}

/// One line of a session's JSONL journal.
///
/// Within a session the `parent_uuid` chain is a total order matching
/// append order, and `uuid` values are unique. Consumers must ignore
/// unknown keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    /// The owning session.
    pub session_id: Uuid,
    /// Unique id of this entry.
    pub uuid: Uuid,
    /// The previous entry's `uuid`, or null for the first entry.
    pub parent_uuid: Option<Uuid>,
    /// When the entry was appended.
    #[serde(with = "timestamp_ms")]
    pub timestamp: DateTime<Utc>,
    /// What the entry records.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Conversational payload, when the entry carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<EntryMessage>,
    /// Accounting and tool detail.
    #[serde(default, skip_serializing_if = "EntryMetadata::is_empty")]
    pub metadata: EntryMetadata,
}

/// An entry the store has not yet threaded into the session.
///
/// The store assigns `uuid`, `parentUuid`, `sessionId`, and the timestamp
/// on append.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    /// What the entry records.
    pub entry_type: EntryType,
    /// Conversational payload.
    pub message: Option<EntryMessage>,
    /// Accounting and tool detail.
    pub metadata: EntryMetadata,
}

impl EntryDraft {
    /// A user utterance.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::User,
            message: Some(EntryMessage {
                role: Role::User,
                content: content.into(),
            }),
            metadata: EntryMetadata::default(),
        }
    }

    /// An assistant completion.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Assistant,
            message: Some(EntryMessage {
                role: Role::Assistant,
                content: content.into(),
            }),
            metadata: EntryMetadata::default(),
        }
    }

    /// A shell command such as `clear` or `resume`.
    #[must_use]
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Command,
            message: Some(EntryMessage {
                role: Role::User,
                content: command.into(),
            }),
            metadata: EntryMetadata::default(),
        }
    }

    /// A tool invocation with its (already truncated) result preview.
    #[must_use]
    pub fn tool_use(call: &ToolCall, result_preview: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::ToolUse,
            message: None,
            metadata: EntryMetadata {
                tool: Some(call.name().to_string()),
                args: Some(call.args()),
                result_preview: Some(result_preview.into()),
                ..EntryMetadata::default()
            },
        }
    }

    /// A tool invocation that failed.
    #[must_use]
    pub fn tool_error(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::ToolUse,
            message: None,
            metadata: EntryMetadata {
                tool: Some(call.name().to_string()),
                args: Some(call.args()),
                error: Some(error.into()),
                ..EntryMetadata::default()
            },
        }
    }

    /// A surfaced error.
    #[must_use]
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Error,
            message: None,
            metadata: EntryMetadata {
                error: Some(description.into()),
                ..EntryMetadata::default()
            },
        }
    }

    /// Attach turn accounting to this draft.
    #[must_use]
    pub fn with_accounting(mut self, usage: Option<TokenUsage>, duration_ms: u64) -> Self {
        self.metadata.tokens = usage.map(|u| u.total());
        self.metadata.duration_ms = Some(duration_ms);
        self
    }
}
