//! Chat event stream
//!
//! Wraps a response body as a lazy, finite sequence of decoded events with
//! cooperative cancellation.

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::StreamEvent;
use super::sse::SseDecoder;
use super::store::{ChatStore, MessageAction};
use crate::error::StreamError;

/// Decoded events of one chat response.
///
/// Not restartable: after a terminal event, the body ending, an error, or
/// cancellation, `next` keeps returning `None`. Frames that follow a terminal
/// event are discarded.
pub struct EventStream {
    body: BoxStream<'static, Result<Bytes, StreamError>>,
    decoder: SseDecoder,
    /// Events decoded from the last chunk, not yet handed out
    pending: VecDeque<Result<StreamEvent, StreamError>>,
    cancel: CancellationToken,
    body_done: bool,
    finished: bool,
}

impl EventStream {
    pub fn new<S, E>(body: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display,
    {
        let body = body
            .map(|chunk| chunk.map_err(|e| StreamError::Transport(e.to_string())))
            .boxed();
        Self {
            body,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            cancel,
            body_done: false,
            finished: false,
        }
    }

    /// Next decoded event.
    ///
    /// Cancellation is checked before every yield, so nothing decoded after
    /// the token fires is handed out.
    pub async fn next(&mut self) -> Option<Result<StreamEvent, StreamError>> {
        loop {
            if self.finished {
                return None;
            }
            if self.cancel.is_cancelled() {
                return Some(self.abort());
            }

            if let Some(item) = self.pending.pop_front() {
                match &item {
                    Ok(event) if event.is_terminal() => {
                        if !self.pending.is_empty() || !self.body_done {
                            debug!("Terminal {} event, ignoring the rest of the body", event.tag());
                        }
                        self.finish();
                    }
                    Ok(_) => {}
                    Err(_) => self.finish(),
                }
                return Some(item);
            }

            if self.body_done {
                self.finished = true;
                warn!(
                    "Stream body closed after {} events without stream-end",
                    self.decoder.event_count()
                );
                return Some(Err(StreamError::ClosedEarly));
            }

            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                chunk = self.body.next() => Some(chunk),
            };
            let Some(chunk) = chunk else {
                return Some(self.abort());
            };

            match chunk {
                Some(Ok(bytes)) => {
                    let decoded = self.decoder.feed(&bytes);
                    self.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    self.finish();
                    return Some(Err(e));
                }
                None => {
                    self.body_done = true;
                    if let Some(last) = self.decoder.finish() {
                        self.pending.push_back(last);
                    }
                }
            }
        }
    }

    fn abort(&mut self) -> Result<StreamEvent, StreamError> {
        info!(
            "Stream aborted after {} events ({} undelivered)",
            self.decoder.event_count(),
            self.pending.len()
        );
        self.finish();
        Err(StreamError::Aborted)
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pending.clear();
    }
}

/// Feed every event of `events` into `store` until the stream ends.
///
/// `on_event` sees each event right after it was applied. Errors leave the
/// pending message in `Error` (or `Aborted` on cancellation) and are returned.
pub async fn drive<F>(
    events: &mut EventStream,
    store: &mut ChatStore,
    mut on_event: F,
) -> Result<(), StreamError>
where
    F: FnMut(&StreamEvent, &ChatStore),
{
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                let applied = event.clone();
                store.dispatch(MessageAction::Event(event));
                on_event(&applied, store);
            }
            Err(StreamError::Aborted) => {
                store.dispatch(MessageAction::Abort);
                return Err(StreamError::Aborted);
            }
            Err(e) => {
                store.dispatch(MessageAction::Fail(e.to_string()));
                return Err(e);
            }
        }
    }
    Ok(())
}
