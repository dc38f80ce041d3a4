//! KRT Configuration Management
//!
//! Handles configuration from environment variables and TOML files,
//! with defaults suitable for local runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Batch orchestration configuration
    pub batch: BatchConfig,

    /// Pattern extraction configuration
    pub extraction: ExtractionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // LLM
        if let Ok(provider) = std::env::var("KRT_LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("KRT_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("KRT_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Ok(key) = std::env::var("KRT_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        } else if self.llm.api_key.is_none() {
            let fallback = match self.llm.provider {
                LlmProvider::OpenAI => std::env::var("OPENAI_API_KEY").ok(),
                LlmProvider::Anthropic => std::env::var("ANTHROPIC_API_KEY").ok(),
                LlmProvider::Ollama => None,
            };
            self.llm.api_key = fallback;
        }

        // Batch
        if let Some(workers) = parse_env::<usize>("KRT_MAX_WORKERS")? {
            self.batch.max_workers = workers;
        }
        if let Some(secs) = parse_env::<u64>("KRT_CALL_TIMEOUT_SECS")? {
            self.batch.call_timeout_secs = secs;
        }
        if let Some(attempts) = parse_env::<u32>("KRT_MAX_ATTEMPTS")? {
            self.batch.max_attempts = attempts;
        }
        if let Some(rpm) = parse_env::<u32>("KRT_REQUESTS_PER_MINUTE")? {
            self.batch.requests_per_minute = rpm;
        }
        if let Some(fallback) = parse_env::<bool>("KRT_FALLBACK_TO_PATTERNS")? {
            self.batch.fallback_to_patterns = fallback;
        }

        // Extraction
        if let Ok(path) = std::env::var("KRT_RULES_FILE") {
            self.extraction.rules_file = Some(PathBuf::from(path));
        }

        // Logging
        if let Ok(level) = std::env::var("KRT_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Check the values that would otherwise only fail mid-run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.max_workers".to_string(),
                value: "0".to_string(),
            });
        }
        if self.batch.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.max_attempts".to_string(),
                value: "0".to_string(),
            });
        }
        if self.batch.requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.requests_per_minute".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// API key for the selected provider
    pub api_key: Option<String>,

    /// Base URL override (OpenAI-compatible endpoints such as DeepSeek or Ollama's /v1)
    pub base_url: Option<String>,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Maximum characters of article text placed in the prompt
    pub max_prompt_chars: usize,

    /// Extra instructions appended to the prompt
    pub extra_instructions: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            api_key: None,
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            max_prompt_chars: 150_000,
            extra_instructions: None,
        }
    }
}

impl LlmConfig {
    /// Check that the provider has the credentials it needs.
    /// OpenAI-compatible endpoints given by `base_url` may run without a key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let needs_key = match self.provider {
            LlmProvider::OpenAI => self.base_url.is_none(),
            LlmProvider::Anthropic => true,
            LlmProvider::Ollama => false,
        };
        let has_key = self
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());

        if needs_key && !has_key {
            return Err(ConfigError::MissingRequired(format!(
                "API key for provider '{}' (set KRT_LLM_API_KEY)",
                self.provider
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired("llm.model".to_string()));
        }
        Ok(())
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI or any OpenAI-compatible chat completions endpoint
    OpenAI,
    Ollama,
    Anthropic,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai_compatible" | "deepseek" | "grok" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(ConfigError::InvalidValue {
                key: "KRT_LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Batch orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker pool size (articles processed concurrently)
    pub max_workers: usize,

    /// Timeout for a single external extractor call, in seconds
    pub call_timeout_secs: u64,

    /// Attempts per article against the external extractor
    pub max_attempts: u32,

    /// First retry delay, in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound on the retry delay, in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff growth factor
    pub backoff_multiplier: f64,

    /// External extractor calls allowed per minute across all workers
    pub requests_per_minute: u32,

    /// Run the pattern engine when the external extractor is exhausted
    pub fallback_to_patterns: bool,

    /// Global deadline for the whole batch, in seconds
    pub deadline_secs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            call_timeout_secs: 120,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            requests_per_minute: 60,
            fallback_to_patterns: false,
            deadline_secs: None,
        }
    }
}

/// Pattern extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Replace the built-in rule table with this TOML file
    pub rules_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.batch.max_workers, 4);
        assert_eq!(config.batch.max_attempts, 3);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(!config.batch.fallback_to_patterns);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "openai_compatible".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "Anthropic".parse::<LlmProvider>().unwrap(),
            LlmProvider::Anthropic
        );
        assert!("gemini".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [batch]
            max_workers = 8
            fallback_to_patterns = true

            [llm]
            provider = "ollama"
            model = "llama3.1"
            "#,
        )
        .unwrap();

        assert_eq!(config.batch.max_workers, 8);
        assert!(config.batch.fallback_to_patterns);
        assert_eq!(config.batch.max_attempts, 3);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_llm_validate_requires_key() {
        let config = LlmConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));

        let ollama = LlmConfig {
            provider: LlmProvider::Ollama,
            ..LlmConfig::default()
        };
        assert!(ollama.validate().is_ok());

        let keyed = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        assert!(keyed.validate().is_ok());
    }

    #[test]
    fn test_openai_compatible_endpoint_without_key() {
        let local = LlmConfig {
            provider: LlmProvider::OpenAI,
            base_url: Some("http://localhost:11434/v1".to_string()),
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(local.validate().is_ok());

        let anthropic = LlmConfig {
            provider: LlmProvider::Anthropic,
            base_url: Some("http://localhost:8080".to_string()),
            ..LlmConfig::default()
        };
        assert!(anthropic.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = AppConfig::default();
        config.batch.max_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
