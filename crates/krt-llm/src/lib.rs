//! KRT LLM - AI-backed extraction
//!
//! Provider clients (OpenAI-compatible, Ollama, Anthropic), the extraction
//! prompt, and an `LlmExtractor` that plugs into the shared candidate
//! pipeline.

pub mod client;
pub mod extractor;
pub mod prompt;

pub use client::{
    create_llm_client, AnthropicClient, LlmClient, OllamaClient, OpenAiClient,
};
pub use extractor::{parse_response, LlmExtractor};
pub use prompt::{build_user_prompt, SYSTEM_PROMPT};
