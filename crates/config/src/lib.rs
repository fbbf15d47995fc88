//! Configuration loading, validation, and management for Tollgate.
//!
//! Loads configuration from `~/.tollgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.tollgate/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the Messages API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifier sent with every call
    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Scratch-space tool settings
    #[serde(default)]
    pub scratch: ScratchConfig,
}

fn default_api_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-sonnet-4-5".into()
}
fn default_max_tokens() -> u32 {
    4096
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("scratch", &self.scratch)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model calls allowed per conversational turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// How long a gated tool waits for approval before it is auto-denied
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_rounds() -> u32 {
    10
}
fn default_confirmation_timeout_secs() -> u64 {
    120
}
fn default_system_prompt() -> String {
    "You are a helpful assistant with access to tools. Some tools change things \
     and need the user's approval before they run; if an approval is denied or \
     times out, say so plainly instead of claiming the action happened."
        .into()
}

impl AgentConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScratchConfig {
    /// Sandbox root for the file tools. Defaults to `~/.tollgate/scratch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.tollgate/config.toml).
    ///
    /// Environment overrides:
    /// - `TOLLGATE_API_KEY`, then `ANTHROPIC_API_KEY` (only if the file has no key)
    /// - `TOLLGATE_MODEL`
    /// - `TOLLGATE_MAX_ROUNDS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`, then re-validate.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("TOLLGATE_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY"));
        }

        if let Some(model) = lookup("TOLLGATE_MODEL") {
            self.model = model;
        }

        if let Some(raw) = lookup("TOLLGATE_MAX_ROUNDS") {
            self.agent.max_rounds = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TOLLGATE_MAX_ROUNDS must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tollgate")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Sandbox root for the scratch-space tools.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch
            .dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("scratch"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".into()));
        }

        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be > 0".into(),
            ));
        }

        if self.agent.confirmation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.confirmation_timeout_secs must be > 0".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            scratch: ScratchConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
