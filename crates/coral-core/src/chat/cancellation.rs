//! Cancellation support for chat streams
//!
//! One handle per session. Each exchange gets its own token, so stopping a
//! reply never leaks into the next one.

use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Owns the token of the current chat exchange.
///
/// Clones share state: a clone held by a signal handler cancels whatever
/// exchange is running when the signal arrives.
#[derive(Clone, Default)]
pub struct StreamCancellation {
    exchange: Arc<RwLock<Option<CancellationToken>>>,
}

impl StreamCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new exchange and return the token for its stream.
    ///
    /// A still running exchange is cancelled first.
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut exchange = self.exchange.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = exchange.replace(token.clone()) {
            if !previous.is_cancelled() {
                debug!("Cancelling previous exchange before starting a new one");
                previous.cancel();
            }
        }
        token
    }

    /// Stop the current exchange, if any. Later exchanges are unaffected.
    pub fn cancel(&self) {
        let exchange = self.exchange.read().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = exchange.as_ref() {
            token.cancel();
        }
    }

    /// Whether the current exchange was stopped
    pub fn is_cancelled(&self) -> bool {
        let exchange = self.exchange.read().unwrap_or_else(|e| e.into_inner());
        exchange.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
