//! Bearer token sources
//!
//! A 401 from the backend triggers exactly one [`CredentialSource::refresh`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Token for the next request, if any
    async fn token(&self) -> Result<Option<String>>;

    /// Fetch a fresh token after the backend rejected the current one
    async fn refresh(&self) -> Result<Option<String>>;
}

/// A fixed token (or none, for backends without auth)
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl CredentialSource for StaticToken {
    async fn token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }

    async fn refresh(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Token kept in a file that another process (a login flow) rewrites
pub struct TokenFile {
    path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl TokenFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cached: RwLock::new(None),
        }
    }

    async fn read(&self) -> Result<Option<String>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            warn!("TokenFile: token file does not exist at {:?}", self.path);
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read token file {}", self.path.display()))?;
        let token = content.trim();
        debug!("TokenFile: read token of length {}", token.len());
        Ok((!token.is_empty()).then(|| token.to_string()))
    }
}

#[async_trait]
impl CredentialSource for TokenFile {
    async fn token(&self) -> Result<Option<String>> {
        if let Some(token) = self.cached.read().await.clone() {
            return Ok(Some(token));
        }
        let token = self.read().await?;
        *self.cached.write().await = token.clone();
        Ok(token)
    }

    async fn refresh(&self) -> Result<Option<String>> {
        info!("TokenFile: re-reading {:?}", self.path);
        let token = self.read().await?;
        *self.cached.write().await = token.clone();
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_file_caches_until_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "first\n").unwrap();

        let source = TokenFile::new(path.clone());
        assert_eq!(source.token().await.unwrap().as_deref(), Some("first"));

        std::fs::write(&path, "second").unwrap();
        assert_eq!(source.token().await.unwrap().as_deref(), Some("first"));
        assert_eq!(source.refresh().await.unwrap().as_deref(), Some("second"));
        assert_eq!(source.token().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_missing_token_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = TokenFile::new(dir.path().join("absent"));
        assert_eq!(source.token().await.unwrap(), None);
    }
}
