//! Error types for the chat pipeline

use thiserror::Error;

use crate::chat::types::FinishReason;

/// Failures while decoding or consuming a chat event stream
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    /// A `data:` payload was not valid JSON
    #[error("invalid JSON in stream frame: {0}")]
    InvalidJson(String),

    /// The payload had no `event` tag, or one outside the known set
    #[error("unrecognized stream event: {0}")]
    UnknownEvent(String),

    /// The tag was known but its payload did not match the expected shape
    #[error("malformed '{event}' payload: {reason}")]
    MalformedPayload { event: String, reason: String },

    /// The stream ended with a finish reason other than COMPLETE
    #[error("stream finished with {reason}: {message}")]
    Incomplete {
        reason: FinishReason,
        message: String,
    },

    /// The response body closed before a stream-end event
    #[error("stream closed before stream-end")]
    ClosedEarly,

    /// Reading the response body failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The stream was cancelled by the caller
    #[error("stream aborted")]
    Aborted,
}

/// Failures talking to the chat backend
#[derive(Debug, Error)]
pub enum ClientError {
    /// Credentials were rejected, even after one refresh
    #[error("unauthorized: please log in again")]
    Unauthorized,

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("credential lookup failed: {0}")]
    Credentials(String),

    #[error(transparent)]
    Stream(#[from] StreamError),
}
