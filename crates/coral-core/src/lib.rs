//! Coral core library
//!
//! Streaming chat pipeline for the Coral chat backend: SSE decoding, the
//! conversation message store, citation indexing, and markdown table export.

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod markdown;

pub use chat::{
    span_key, BotMessage, BotState, ChatMessage, ChatStore, CitationIndex, Conversation,
    EventStream, StreamCancellation, StreamEvent,
};
pub use client::{ChatClient, ChatRequest, CredentialSource};
pub use config::CoralConfig;
pub use error::{ClientError, StreamError};
