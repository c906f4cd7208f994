//! Configuration loading and management for profsumma.
//!
//! Loads settings from `profsumma.toml` with environment variable overrides for
//! credentials, source URLs and the run mode.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "profsumma.toml";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required API key for provider: {0}")]
    MissingApiKey(String),
    #[error("invalid run mode '{0}', expected 'batch' or 'full'")]
    InvalidRunMode(String),
}

/// Which professors a run touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Next slice of the list, skipping professors that already have a summary
    #[default]
    Batch,
    /// Every professor, never replacing a good summary with a failure placeholder
    Full,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" | "daily" | "false" | "0" => Ok(RunMode::Batch),
            "full" | "weekly" | "true" | "1" => Ok(RunMode::Full),
            other => Err(ConfigError::InvalidRunMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Batch => f.write_str("batch"),
            RunMode::Full => f.write_str("full"),
        }
    }
}

/// Remote CSV documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub ratings_url: String,
    #[serde(default)]
    pub comments_url: String,
    /// Base of the professor permalinks embedded in summaries
    #[serde(default = "default_profile_base_url")]
    pub profile_base_url: String,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// LLM provider: "gemini" or "openai"
    pub provider: String,
    /// Model identifier (e.g., "gemini-2.0-flash"); empty picks the provider default
    pub model: String,
    /// Text placed ahead of every generated prompt
    pub persona: String,
    /// Overrides the provider's default endpoint
    pub endpoint: Option<String>,
}

impl AgentConfig {
    /// Configured model, or the default for the configured provider
    pub fn model(&self) -> &str {
        if !self.model.trim().is_empty() {
            return &self.model;
        }
        match self.provider.as_str() {
            "openai" => DEFAULT_OPENAI_MODEL,
            _ => DEFAULT_GEMINI_MODEL,
        }
    }
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub gemini_key: Option<String>,
    #[serde(default)]
    pub openai_key: Option<String>,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base path for the result and cursor files
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub mode: RunMode,
    pub batch_size: usize,
    /// Pause between consecutive summary requests
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// First back-off after a rate-limit response, doubled on every attempt
    pub rate_limit_base_ms: u64,
    /// Multiplied by the attempt number after any other failure
    pub retry_base_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub max_comment_chars: usize,
    pub prompt_comment_chars: usize,
    pub separator: String,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sources: SourcesConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub aggregate: AggregateConfig,
}

impl Config {
    /// Load configuration from the default location (profsumma.toml in cwd or home)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::find_config_file();
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse configuration text without consulting the environment
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override secrets and run-time switches from environment variables
    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.api.gemini_key = Some(key);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.api.openai_key = Some(key);
        }
        if let Some(url) = lookup("PROFSUMMA_RATINGS_URL") {
            self.sources.ratings_url = url;
        }
        if let Some(url) = lookup("PROFSUMMA_COMMENTS_URL") {
            self.sources.comments_url = url;
        }
        if let Some(mode) = lookup("PROFSUMMA_RUN_MODE") {
            self.batch.mode = mode.parse()?;
        }
        Ok(())
    }

    /// Find the config file in standard locations
    fn find_config_file() -> PathBuf {
        // Check current directory first
        let local_config = PathBuf::from(CONFIG_FILE);
        if local_config.exists() {
            return local_config;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config").join("profsumma").join(CONFIG_FILE);
            if home_config.exists() {
                return home_config;
            }
        }

        // Default to local path (will error on read)
        local_config
    }

    /// Get the API key for the configured provider
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        let key = match self.agent.provider.as_str() {
            "gemini" => self.api.gemini_key.as_deref(),
            "openai" => self.api.openai_key.as_deref(),
            _ => None,
        };
        key.filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.agent.provider.clone()))
    }

    /// Resolve the run mode, letting a command-line choice win
    pub fn run_mode(&self, cli_override: Option<RunMode>) -> RunMode {
        cli_override.unwrap_or(self.batch.mode)
    }

    pub fn results_path(&self) -> PathBuf {
        self.storage.path.join("summaries.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.storage.path.join("state.json")
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.batch.request_delay_ms)
    }
}

fn default_profile_base_url() -> String {
    "https://www.ratemyprofessors.com".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: String::new(),
            persona: String::new(),
            endpoint: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Batch,
            batch_size: 50,
            request_delay_ms: 4000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_base_ms: 2000,
            retry_base_ms: 1000,
        }
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            max_comment_chars: 2000,
            prompt_comment_chars: 1200,
            separator: " | ".to_string(),
        }
    }
}
