//! Client configuration
//!
//! Loaded from `<config dir>/coral/config.toml`, then overridden by
//! `CORAL_API_URL`, `CORAL_API_TOKEN` and `CORAL_USER_ID`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_USER_ID: &str = "user-id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoralConfig {
    /// Backend base URL, without the `/v1` suffix
    pub api_url: String,
    /// Sent as the `User-Id` header
    pub user_id: String,
    /// Bearer token; takes precedence over `token_file`
    pub access_token: Option<String>,
    /// File holding the bearer token, re-read on 401
    pub token_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub deployment: Option<String>,
    pub model: Option<String>,
}

impl Default for CoralConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            access_token: None,
            token_file: None,
            connect_timeout_secs: 10,
            deployment: None,
            model: None,
        }
    }
}

impl CoralConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("coral").join("config.toml"))
    }

    /// Load from `path` (or the default location) and apply env overrides.
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading config from {:?}", path);
                Self::from_file(&path)?
            }
            _ => {
                debug!("No config file, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply overrides from a variable lookup (the process env in `load`)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CORAL_API_URL").filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(token) = lookup("CORAL_API_TOKEN").filter(|v| !v.is_empty()) {
            self.access_token = Some(token);
        }
        if let Some(user) = lookup("CORAL_USER_ID").filter(|v| !v.is_empty()) {
            self.user_id = user;
        }
    }

    /// `api_url` joined with a `/v1/...` path
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
