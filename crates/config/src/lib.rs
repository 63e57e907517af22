//! Configuration loading, validation, and management for Canopy.
//!
//! Loads configuration from `~/.canopy/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.canopy/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible endpoint base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Conversation engine settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Knowledge retrieval settings
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Retry policy for blocking model calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Persistence backend
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_model() -> String {
    "llama-3.1-8b-instant".into()
}
fn default_temperature() -> f32 {
    0.7
}

/// Redact a secret string for Debug output.
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
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("chat", &self.chat)
            .field("knowledge", &self.knowledge)
            .field("retry", &self.retry)
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Raw turns kept verbatim (the recent window)
    #[serde(default = "default_max_history")]
    pub max_history_messages: usize,

    /// Compaction runs whenever the stored turn count is a multiple of this
    #[serde(default = "default_summarize_every")]
    pub summarize_every: usize,

    /// Model input limit used by the budget allocator
    #[serde(default = "default_max_input_tokens")]
    pub model_max_input_tokens: usize,

    /// Allowance subtracted from the input limit for the reply
    #[serde(default = "default_reserved_output")]
    pub reserved_output_tokens: usize,

    /// `max_tokens` sent with each request
    #[serde(default = "default_max_output")]
    pub max_output_tokens: u32,

    #[serde(default = "default_summary_word_cap")]
    pub summary_word_cap: usize,

    #[serde(default = "default_notification_body_chars")]
    pub notification_body_chars: usize,

    #[serde(default = "default_notification_message_chars")]
    pub notification_message_chars: usize,

    /// Replaces the built-in assistant preamble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_history() -> usize {
    10
}
fn default_summarize_every() -> usize {
    10
}
fn default_max_input_tokens() -> usize {
    6000
}
fn default_reserved_output() -> usize {
    4096
}
fn default_max_output() -> u32 {
    4096
}
fn default_summary_word_cap() -> usize {
    300
}
fn default_notification_body_chars() -> usize {
    200
}
fn default_notification_message_chars() -> usize {
    500
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_messages: default_max_history(),
            summarize_every: default_summarize_every(),
            model_max_input_tokens: default_max_input_tokens(),
            reserved_output_tokens: default_reserved_output(),
            max_output_tokens: default_max_output(),
            summary_word_cap: default_summary_word_cap(),
            notification_body_chars: default_notification_body_chars(),
            notification_message_chars: default_notification_message_chars(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    #[serde(default = "default_match_count")]
    pub match_count: usize,

    /// Token cap for the knowledge block
    #[serde(default = "default_knowledge_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Optional JSON file of `{title, content}` documents indexed at start-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_path: Option<PathBuf>,
}

fn default_match_threshold() -> f32 {
    0.4
}
fn default_match_count() -> usize {
    3
}
fn default_knowledge_tokens() -> usize {
    2000
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
            max_tokens: default_knowledge_tokens(),
            embedding_model: default_embedding_model(),
            documents_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier_ms")]
    pub multiplier_ms: u64,

    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_min_backoff_ms() -> u64 {
    2_000
}
fn default_max_backoff_ms() -> u64 {
    10_000
}
fn default_multiplier_ms() -> u64 {
    1_000
}
fn default_attempt_timeout() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier_ms: default_multiplier_ms(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database path; defaults to `~/.canopy/canopy.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// The database path, falling back to the config directory.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("canopy.sqlite"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.canopy/config.toml).
    ///
    /// Environment overrides:
    /// - `CANOPY_API_KEY`, then `GROQ_API_KEY` (only when the file has no key)
    /// - `CANOPY_MODEL`
    /// - `CANOPY_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("CANOPY_API_KEY").or_else(|| lookup("GROQ_API_KEY"));
        }
        if let Some(model) = lookup("CANOPY_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("CANOPY_BASE_URL") {
            self.base_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".canopy")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.chat.summarize_every == 0 {
            return Err(ConfigError::ValidationError(
                "chat.summarize_every must be at least 1".into(),
            ));
        }
        if self.chat.max_history_messages == 0 {
            return Err(ConfigError::ValidationError(
                "chat.max_history_messages must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.knowledge.match_threshold) {
            return Err(ConfigError::ValidationError(
                "knowledge.match_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.min_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::ValidationError(
                "retry.min_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            chat: ChatConfig::default(),
            knowledge: KnowledgeConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
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
