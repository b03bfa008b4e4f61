//! HTTP client for the chat backend

mod credentials;
mod request;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use credentials::{CredentialSource, StaticToken, TokenFile};
pub use request::{ChatRequest, ToolSpec};

use crate::chat::stream::EventStream;
use crate::chat::types::ConversationRecord;
use crate::config::CoralConfig;
use crate::error::{ClientError, StreamError};

pub struct ChatClient {
    http: reqwest::Client,
    config: CoralConfig,
    credentials: Arc<dyn CredentialSource>,
}

impl ChatClient {
    pub fn new(
        config: CoralConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config,
            credentials,
        })
    }

    /// Pick the credential source the config describes
    pub fn from_config(config: CoralConfig) -> Result<Self, ClientError> {
        let credentials: Arc<dyn CredentialSource> = match (&config.access_token, &config.token_file)
        {
            (Some(token), _) => Arc::new(StaticToken::new(Some(token.clone()))),
            (None, Some(path)) => Arc::new(TokenFile::new(path.clone())),
            (None, None) => Arc::new(StaticToken::new(None)),
        };
        Self::new(config, credentials)
    }

    pub fn config(&self) -> &CoralConfig {
        &self.config
    }

    /// Start a streamed chat turn.
    ///
    /// Cancelling `cancel` before the response arrives fails with
    /// `StreamError::Aborted`; afterwards it aborts the returned stream.
    pub async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<EventStream, ClientError> {
        let url = self.config.endpoint("chat-stream");
        info!(
            "Starting chat stream (conversation: {:?}, {} tools, {} files)",
            request.conversation_id,
            request.tools.len(),
            request.file_ids.len()
        );

        let send = self.send_authorized(|http| {
            http.post(&url)
                .header(ACCEPT, "text/event-stream")
                .json(request)
        });
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Aborted.into()),
            response = send => response?,
        };

        Ok(EventStream::new(response.bytes_stream(), cancel))
    }

    /// Load a stored conversation
    pub async fn get_conversation(&self, id: &str) -> Result<ConversationRecord, ClientError> {
        let url = self.config.endpoint(&format!("conversations/{}", id));
        let response = self.send_authorized(|http| http.get(&url)).await?;
        Ok(response.json().await?)
    }

    fn authorize(&self, builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let builder = builder.header("User-Id", &self.config.user_id);
        match token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// Send a request, refreshing credentials and retrying once on 401
    async fn send_authorized<F>(&self, build: F) -> Result<Response, ClientError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self
            .credentials
            .token()
            .await
            .map_err(|e| ClientError::Credentials(format!("{:#}", e)))?;
        let response = self
            .authorize(build(&self.http), token.as_deref())
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        warn!("Backend returned 401, refreshing credentials and retrying once");
        let token = self
            .credentials
            .refresh()
            .await
            .map_err(|e| ClientError::Credentials(format!("{:#}", e)))?;
        let response = self
            .authorize(build(&self.http), token.as_deref())
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        debug!("Backend responded {}", status);
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Backend error {}: {}", status, body);
    Err(ClientError::Http {
        status: status.as_u16(),
        body,
    })
}
