//! KRT Core - Schema, error types and shared traits
//!
//! This crate defines the abstractions every other KRT crate builds on:
//! - The compliance schema (resource types, rows, documents)
//! - Raw candidates produced by extractors before normalization
//! - Named article sections consumed by extractors
//! - Error taxonomy, including typed external-extraction failures
//! - The `CandidateExtractor` capability shared by the pattern and AI extractors
//! - Configuration management

pub mod config;
pub mod schema;
pub mod section;

pub use config::{
    AppConfig, BatchConfig, ConfigError, ExtractionConfig, LlmConfig, LlmProvider, LoggingConfig,
};
pub use schema::{
    ExtractionMode, KrtDocument, NewOrReuse, RawCandidate, ResourceRow, ResourceType,
    NO_IDENTIFIER, UNKNOWN_RESOURCE,
};
pub use section::{SectionName, Sections};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for KRT operations
#[derive(Error, Debug)]
pub enum KrtError {
    /// Startup configuration problem (bad rule table, missing API key).
    /// Fatal: must be surfaced before any batch run.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for KrtError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KrtError>;

/// Reason an external (AI) extractor call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionErrorKind {
    Timeout,
    RateLimited,
    MalformedResponse,
    ProviderError,
}

impl ExtractionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rateLimited",
            Self::MalformedResponse => "malformedResponse",
            Self::ProviderError => "providerError",
        }
    }
}

impl std::fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure from a candidate extractor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn new(kind: ExtractionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::RateLimited, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::MalformedResponse, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::ProviderError, message)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Produces raw resource candidates from article sections.
///
/// Implemented by the pattern engine and the AI adapter so that
/// normalization and merging are written once.
#[async_trait::async_trait]
pub trait CandidateExtractor: Send + Sync {
    /// Extract candidates, or fail with a typed reason
    async fn extract(
        &self,
        sections: &Sections,
    ) -> std::result::Result<Vec<RawCandidate>, ExtractionError>;

    /// Which document mode this extractor produces
    fn mode(&self) -> ExtractionMode;

    /// Whether calls leave the process (and are subject to timeouts,
    /// retries and rate limiting)
    fn is_external(&self) -> bool {
        self.mode() == ExtractionMode::Llm
    }
}

// ============================================================================
// Tests
// ============================================================================
