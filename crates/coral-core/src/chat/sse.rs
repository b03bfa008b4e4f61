//! SSE (Server-Sent Events) decoding
//!
//! Turns raw response bytes into lines and each `data:` line into a
//! [`StreamEvent`].

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::events::StreamEvent;
use crate::error::StreamError;

/// Line-oriented SSE decoder that handles partial lines across chunks
pub struct SseDecoder {
    /// Bytes after the last newline of the previous chunk
    partial_line: Vec<u8>,
    /// When the decoder was created
    stream_start: Instant,
    /// Decoded event counter for logging
    event_count: usize,
    /// Bytes received counter
    bytes_received: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            partial_line: Vec::new(),
            stream_start: Instant::now(),
            event_count: 0,
            bytes_received: 0,
        }
    }

    /// Feed a chunk of body bytes, decoding every line it completes.
    ///
    /// Splitting on raw bytes keeps multi-byte characters that straddle a
    /// chunk boundary intact.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent, StreamError>> {
        self.bytes_received += bytes.len();
        debug!(
            "SSE chunk received: {} bytes (total: {} bytes)",
            bytes.len(),
            self.bytes_received
        );
        self.partial_line.extend_from_slice(bytes);

        let mut decoded = Vec::new();
        while let Some(pos) = self.partial_line.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial_line.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(result) = self.decode_line(&line).transpose() {
                decoded.push(result);
            }
        }
        decoded
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<Result<StreamEvent, StreamError>> {
        let elapsed = self.stream_start.elapsed();
        info!(
            "SSE decoder finishing: {:?} elapsed, {} events, {} bytes total",
            elapsed, self.event_count, self.bytes_received
        );
        if self.partial_line.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.partial_line);
        let line = String::from_utf8_lossy(&rest);
        self.decode_line(&line).transpose()
    }

    /// Decode one line of SSE text.
    ///
    /// Returns `Ok(None)` for lines that carry no event (blank lines,
    /// comments, `event:`/`id:`/`retry:` fields).
    pub fn decode_line(&mut self, line: &str) -> Result<Option<StreamEvent>, StreamError> {
        let line = line.trim_end_matches('\r');

        // Skip empty lines and SSE comments
        if line.trim().is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        let data = match line.strip_prefix("data:") {
            Some(data) => data.strip_prefix(' ').unwrap_or(data),
            // Some proxies strip the SSE framing and forward bare JSON lines
            None if line.starts_with('{') => line,
            None => {
                debug!("Skipping SSE field line: {}", line);
                return Ok(None);
            }
        };
        if data.trim().is_empty() {
            return Ok(None);
        }

        self.event_count += 1;
        let event = match decode_payload(data) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    "Failed to decode SSE event #{}: {} ({})",
                    self.event_count, e, data
                );
                return Err(e);
            }
        };
        debug!(
            "SSE event #{} at {:?}: event={}",
            self.event_count,
            self.stream_start.elapsed(),
            event.tag()
        );

        ensure_complete(event).map(Some)
    }

    /// Number of events decoded so far
    pub fn event_count(&self) -> usize {
        self.event_count
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one `data:` payload into a stream event
pub fn decode_payload(data: &str) -> Result<StreamEvent, StreamError> {
    let json: Value =
        serde_json::from_str(data).map_err(|e| StreamError::InvalidJson(e.to_string()))?;

    let tag = json
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| StreamError::UnknownEvent("<missing event tag>".to_string()))?;
    if !StreamEvent::TAGS.contains(&tag) {
        return Err(StreamError::UnknownEvent(tag.to_string()));
    }
    let tag = tag.to_string();

    serde_json::from_value(json).map_err(|e| StreamError::MalformedPayload {
        event: tag,
        reason: e.to_string(),
    })
}

/// Reject a stream-end whose finish reason is not COMPLETE
fn ensure_complete(event: StreamEvent) -> Result<StreamEvent, StreamError> {
    if let StreamEvent::StreamEnd(end) = &event {
        if !end.finish_reason.is_complete() {
            let reason = end.finish_reason;
            let message = end
                .error
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| format!("generation stopped ({})", reason));
            warn!("Stream ended with {}: {}", reason, message);
            return Err(StreamError::Incomplete { reason, message });
        }
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::FinishReason;

    fn text_frame(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"event": "text-generation", "data": {"text": text}})
        )
    }

    #[test]
    fn test_decode_text_generation() {
        let mut decoder = SseDecoder::new();
        let event = decoder
            .decode_line(r#"data: {"event":"text-generation","data":{"text":"Hello"}}"#)
            .unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::TextGeneration {
                text: "Hello".into()
            })
        );
        assert_eq!(decoder.event_count(), 1);
    }

    #[test]
    fn test_skips_non_data_lines() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.decode_line("").unwrap(), None);
        assert_eq!(decoder.decode_line(": keep-alive").unwrap(), None);
        assert_eq!(decoder.decode_line("event: message").unwrap(), None);
        assert_eq!(decoder.decode_line("id: 7\r").unwrap(), None);
        assert_eq!(decoder.event_count(), 0);
    }

    #[test]
    fn test_invalid_json_fails() {
        let mut decoder = SseDecoder::new();
        let err = decoder.decode_line("data: {not json").unwrap_err();
        assert!(matches!(err, StreamError::InvalidJson(_)));
    }

    #[test]
    fn test_unknown_tag_fails() {
        let mut decoder = SseDecoder::new();
        let err = decoder
            .decode_line(r#"data: {"event":"mystery","data":{}}"#)
            .unwrap_err();
        assert_eq!(err, StreamError::UnknownEvent("mystery".into()));

        let err = decoder.decode_line(r#"data: {"data":{}}"#).unwrap_err();
        assert!(matches!(err, StreamError::UnknownEvent(_)));
    }

    #[test]
    fn test_malformed_payload_fails() {
        let mut decoder = SseDecoder::new();
        let err = decoder
            .decode_line(r#"data: {"event":"text-generation","data":{"text":5}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::MalformedPayload { ref event, .. } if event == "text-generation"
        ));
    }

    #[test]
    fn test_stream_end_error_reason_raises() {
        let mut decoder = SseDecoder::new();
        let err = decoder
            .decode_line(
                r#"data: {"event":"stream-end","data":{"finish_reason":"ERROR","error":"model overloaded"}}"#,
            )
            .unwrap_err();
        assert_eq!(
            err,
            StreamError::Incomplete {
                reason: FinishReason::Error,
                message: "model overloaded".into()
            }
        );
    }

    #[test]
    fn test_stream_end_complete_passes() {
        let mut decoder = SseDecoder::new();
        let event = decoder
            .decode_line(r#"data: {"event":"stream-end","data":{"finish_reason":"COMPLETE"}}"#)
            .unwrap()
            .unwrap();
        assert!(event.is_terminal());
    }

    #[test]
    fn test_feed_handles_partial_lines() {
        let mut decoder = SseDecoder::new();
        let frames = format!("{}{}", text_frame("Hel"), text_frame("lo"));
        let (a, b) = frames.split_at(17);

        let first = decoder.feed(a.as_bytes());
        assert!(first.is_empty());
        let rest = decoder.feed(b.as_bytes());
        let texts: Vec<_> = rest
            .into_iter()
            .map(|r| match r.unwrap() {
                StreamEvent::TextGeneration { text } => text,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_feed_keeps_split_utf8() {
        let mut decoder = SseDecoder::new();
        let frame = text_frame("caf\u{e9} \u{1f980}");
        let bytes = frame.as_bytes();
        // Split inside the four-byte crab
        let cut = frame.find('\u{1f980}').unwrap() + 2;

        assert!(decoder.feed(&bytes[..cut]).is_empty());
        let events = decoder.feed(&bytes[cut..]);
        assert_eq!(
            events,
            vec![Ok(StreamEvent::TextGeneration {
                text: "caf\u{e9} \u{1f980}".into()
            })]
        );
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder
            .feed(br#"data: {"event":"text-generation","data":{"text":"tail"}}"#)
            .is_empty());
        assert_eq!(
            decoder.finish(),
            Some(Ok(StreamEvent::TextGeneration {
                text: "tail".into()
            }))
        );
    }
}
