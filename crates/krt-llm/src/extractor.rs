//! AI-backed candidate extractor
//!
//! Sends the article to an `LlmClient` and parses the reply into raw
//! candidates. Rows go through the same normalization and merging as
//! pattern matches; nothing here fills in defaults.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use krt_core::{
    CandidateExtractor, ExtractionError, ExtractionMode, KrtError, LlmConfig, RawCandidate,
    Sections,
};

use crate::client::{create_llm_client, LlmClient};
use crate::prompt::{build_user_prompt, SYSTEM_PROMPT};

/// Candidate extractor backed by a language model
pub struct LlmExtractor {
    client: Arc<dyn LlmClient>,
    max_prompt_chars: usize,
    extra_instructions: Option<String>,
}

impl LlmExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            max_prompt_chars: LlmConfig::default().max_prompt_chars,
            extra_instructions: None,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, KrtError> {
        let client: Arc<dyn LlmClient> = Arc::from(create_llm_client(config)?);
        Ok(Self::new(client)
            .with_max_prompt_chars(config.max_prompt_chars)
            .with_extra_instructions(config.extra_instructions.clone()))
    }

    pub fn with_max_prompt_chars(mut self, max_chars: usize) -> Self {
        self.max_prompt_chars = max_chars;
        self
    }

    pub fn with_extra_instructions(mut self, extra: Option<String>) -> Self {
        self.extra_instructions = extra;
        self
    }
}

#[async_trait]
impl CandidateExtractor for LlmExtractor {
    async fn extract(&self, sections: &Sections) -> Result<Vec<RawCandidate>, ExtractionError> {
        let prompt = build_user_prompt(
            sections,
            self.max_prompt_chars,
            self.extra_instructions.as_deref(),
        );

        tracing::debug!(
            model = self.client.model(),
            prompt_chars = prompt.len(),
            "Requesting AI extraction"
        );

        let response = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
        let candidates = parse_response(&response)?;

        tracing::debug!(
            model = self.client.model(),
            candidates = candidates.len(),
            "AI extraction parsed"
        );
        Ok(candidates)
    }

    fn mode(&self) -> ExtractionMode {
        ExtractionMode::Llm
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Parse a model reply into raw candidates.
///
/// Accepts a JSON array of row objects, or an object with a `rows` array,
/// optionally wrapped in a markdown code fence. Anything else is a
/// malformed response.
pub fn parse_response(text: &str) -> Result<Vec<RawCandidate>, ExtractionError> {
    let body = strip_code_fence(text.trim());
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ExtractionError::malformed(format!("response is not valid JSON: {e}")))?;

    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(mut obj) => match obj.remove("rows") {
            Some(Value::Array(rows)) => rows,
            _ => {
                return Err(ExtractionError::malformed(
                    "response object has no \"rows\" array",
                ))
            }
        },
        _ => {
            return Err(ExtractionError::malformed(
                "response is neither an array nor an object",
            ))
        }
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Object(obj) => Ok(candidate_from_object(&obj)),
            _ => Err(ExtractionError::malformed(format!(
                "row {} is not an object",
                i + 1
            ))),
        })
        .collect()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop a language tag such as ```json
    match inner.split_once('\n') {
        Some((tag, rest)) if !tag.trim().starts_with(['[', '{']) => rest.trim(),
        _ => inner.trim(),
    }
}

/// Uppercase with underscores as spaces, so "resource_type" and
/// "RESOURCE TYPE" read the same
fn field_key(key: &str) -> String {
    key.trim().replace('_', " ").to_uppercase()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn candidate_from_object(obj: &Map<String, Value>) -> RawCandidate {
    let field = |name: &str| -> String {
        obj.iter()
            .find(|(key, _)| field_key(key) == name)
            .map(|(_, value)| value_text(value))
            .unwrap_or_default()
    };

    let mut candidate = RawCandidate::new(field("RESOURCE TYPE"), field("RESOURCE NAME"))
        .with_vendor(field("SOURCE"))
        .with_identifier(field("IDENTIFIER"))
        .with_additional_info(field("ADDITIONAL INFORMATION"));

    let new_or_reuse = field("NEW/REUSE");
    if !new_or_reuse.trim().is_empty() {
        candidate = candidate.with_new_or_reuse(new_or_reuse);
    }
    candidate
}
