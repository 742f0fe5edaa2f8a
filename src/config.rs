//! Configuration management for chatline
//!
//! This module handles loading, parsing, validating, and managing the
//! application configuration from files, environment variables, and CLI
//! overrides. The per-user chat settings (history window size, compaction
//! threshold, model parameters) are not part of this file: they live with the
//! persisted conversation state, see [`crate::store::ChatConfig`].

use crate::error::{ChatlineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for chatline
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Completion service settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Persisted state location
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Completion service configuration
///
/// Points the HTTP transport at an OpenAI-compatible chat completion
/// endpoint (the upstream service or a forwarding proxy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL; `/v1/chat/completions` is appended
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bearer token sent with every request, if any
    #[serde(default)]
    pub api_key: Option<String>,

    /// Connection establishment timeout in seconds
    ///
    /// Streams themselves are not timed out; a stalled reply is ended by the
    /// user cancelling it or by the upstream closing the connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://api.openai.com".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Path of the state database; the platform data directory is used when unset
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatlineError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ChatlineError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(api_base) = std::env::var("CHATLINE_API_BASE") {
            self.provider.api_base = api_base;
        }

        if let Ok(api_key) = std::env::var("CHATLINE_API_KEY") {
            self.provider.api_key = Some(api_key);
        } else if self.provider.api_key.is_none() {
            if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
                self.provider.api_key = Some(api_key);
            }
        }

        if let Ok(timeout) = std::env::var("CHATLINE_CONNECT_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(seconds) => self.provider.connect_timeout_seconds = seconds,
                Err(_) => tracing::warn!(
                    "Ignoring CHATLINE_CONNECT_TIMEOUT={}: not a number of seconds",
                    timeout
                ),
            }
        }

        if let Ok(state_db) = std::env::var("CHATLINE_STATE_DB") {
            self.storage.path = Some(state_db);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(state) = &cli.state {
            tracing::debug!("Using state database override from CLI: {}", state);
            self.storage.path = Some(state.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `ChatlineError::Config` if the API base is not an http(s) URL
    /// or the connect timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.provider.api_base.trim().is_empty() {
            return Err(ChatlineError::Config("provider.api_base cannot be empty".to_string()).into());
        }

        let url = url::Url::parse(&self.provider.api_base).map_err(|e| {
            ChatlineError::Config(format!(
                "provider.api_base is not a valid URL ({}): {}",
                self.provider.api_base, e
            ))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ChatlineError::Config(format!(
                "provider.api_base must use http or https, got {}",
                url.scheme()
            ))
            .into());
        }

        if self.provider.connect_timeout_seconds == 0 {
            return Err(ChatlineError::Config(
                "provider.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
