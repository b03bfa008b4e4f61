//! Wire types shared by stream events and stored messages

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A retrieval result or tool output that a citation can point at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Tool-specific fields the backend attaches
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Short label for display: title, then url, then id
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.url.as_deref())
            .unwrap_or(&self.document_id)
    }
}

/// A span of generated text backed by one or more documents.
///
/// `start` and `end` are character offsets into the generation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub document_ids: Vec<String>,
}

/// A tool invocation chosen by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Partial tool call streamed in `tool-calls-chunk` events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub parameters: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub generation_id: Option<String>,
}

/// Why the backend stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Complete,
    Error,
    ErrorToxic,
    ErrorLimit,
    UserCancel,
    MaxTokens,
    #[serde(other)]
    Unknown,
}

impl FinishReason {
    pub fn is_complete(self) -> bool {
        self == FinishReason::Complete
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FinishReason::Complete => "COMPLETE",
            FinishReason::Error => "ERROR",
            FinishReason::ErrorToxic => "ERROR_TOXIC",
            FinishReason::ErrorLimit => "ERROR_LIMIT",
            FinishReason::UserCancel => "USER_CANCEL",
            FinishReason::MaxTokens => "MAX_TOKENS",
            FinishReason::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Something the bot did on the way to its answer, shown alongside the text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolEvent {
    /// Free-text plan emitted while tool calls stream in
    Plan { text: String },
    /// Search queries the model decided to run
    Search { queries: Vec<SearchQuery> },
    /// Tool calls the model decided to make
    Calls { calls: Vec<ToolCall> },
    /// Raw tool input
    Input { input: String },
    /// Tool output
    Result { result: String },
}

/// Who wrote a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageAgent {
    User,
    Chatbot,
}

/// A message as the backend stores it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub text: String,
    pub agent: MessageAgent,
    #[serde(default)]
    pub generation_id: Option<String>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

/// A conversation as returned by `GET /v1/conversations/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
