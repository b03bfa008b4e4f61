//! Streaming chat pipeline
//!
//! - `sse`: byte chunks to SSE lines to [`StreamEvent`]s
//! - `stream`: cancellable event sequence over a response body
//! - `store`: message list with a single pending bot message
//! - `citations`: span to document index per generation

mod cancellation;
pub mod citations;
pub mod events;
pub mod sse;
pub mod store;
pub mod stream;
pub mod types;

pub use cancellation::StreamCancellation;
pub use citations::{span_key, CitationIndex};
pub use events::{StreamEnd, StreamEvent};
pub use sse::SseDecoder;
pub use store::{BotMessage, BotState, ChatMessage, ChatStore, Conversation, MessageAction};
pub use stream::{drive, EventStream};
pub use types::{Citation, ConversationRecord, Document, FinishReason, ToolEvent};
