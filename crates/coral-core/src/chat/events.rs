//! Stream event alphabet
//!
//! Every SSE `data:` payload is `{"event": "<tag>", "data": {...}}`; the tag
//! selects the payload shape.

use serde::{Deserialize, Serialize};

use super::types::{
    Citation, Document, FinishReason, SearchQuery, ToolCall, ToolCallDelta,
};

/// Events the chat backend emits while answering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum StreamEvent {
    StreamStart {
        #[serde(default)]
        generation_id: Option<String>,
        #[serde(default)]
        conversation_id: Option<String>,
    },

    TextGeneration { text: String },

    SearchResults {
        #[serde(default)]
        documents: Vec<Document>,
    },

    SearchQueriesGeneration {
        #[serde(default)]
        search_queries: Vec<SearchQuery>,
    },

    ToolCallsChunk {
        #[serde(default)]
        tool_call_delta: Option<ToolCallDelta>,
        #[serde(default)]
        text: Option<String>,
    },

    ToolCallsGeneration {
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
        #[serde(default)]
        text: Option<String>,
    },

    CitationGeneration {
        #[serde(default)]
        citations: Vec<Citation>,
    },

    ToolInput {
        #[serde(default)]
        input: String,
    },

    ToolResult {
        #[serde(default)]
        result: String,
        #[serde(default)]
        documents: Vec<Document>,
    },

    StreamEnd(StreamEnd),

    NonStreamedChatResponse {
        text: String,
        #[serde(default)]
        generation_id: Option<String>,
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        citations: Vec<Citation>,
        #[serde(default)]
        documents: Vec<Document>,
    },
}

/// Final summary of a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEnd {
    pub finish_reason: FinishReason,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub generation_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub search_queries: Vec<SearchQuery>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl StreamEvent {
    /// Every tag the decoder accepts
    pub const TAGS: &'static [&'static str] = &[
        "stream-start",
        "text-generation",
        "search-results",
        "search-queries-generation",
        "tool-calls-chunk",
        "tool-calls-generation",
        "citation-generation",
        "tool-input",
        "tool-result",
        "stream-end",
        "non-streamed-chat-response",
    ];

    /// Wire tag of this event
    pub fn tag(&self) -> &'static str {
        match self {
            StreamEvent::StreamStart { .. } => "stream-start",
            StreamEvent::TextGeneration { .. } => "text-generation",
            StreamEvent::SearchResults { .. } => "search-results",
            StreamEvent::SearchQueriesGeneration { .. } => "search-queries-generation",
            StreamEvent::ToolCallsChunk { .. } => "tool-calls-chunk",
            StreamEvent::ToolCallsGeneration { .. } => "tool-calls-generation",
            StreamEvent::CitationGeneration { .. } => "citation-generation",
            StreamEvent::ToolInput { .. } => "tool-input",
            StreamEvent::ToolResult { .. } => "tool-result",
            StreamEvent::StreamEnd(_) => "stream-end",
            StreamEvent::NonStreamedChatResponse { .. } => "non-streamed-chat-response",
        }
    }

    /// Generation id carried by the event, if the payload has one
    pub fn generation_id(&self) -> Option<&str> {
        match self {
            StreamEvent::StreamStart { generation_id, .. }
            | StreamEvent::NonStreamedChatResponse { generation_id, .. } => {
                generation_id.as_deref()
            }
            StreamEvent::StreamEnd(end) => end.generation_id.as_deref(),
            _ => None,
        }
    }

    /// True for the events that close a generation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::StreamEnd(_) | StreamEvent::NonStreamedChatResponse { .. }
        )
    }
}
