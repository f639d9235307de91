//! Provider-agnostic language-model access.
//!
//! [`LanguageModel`] is the per-vendor seam (Anthropic, OpenAI-compatible,
//! Gemini). [`LlmClient`] sits on top of it and adds what every caller needs:
//! retry, pacing, response caching for deterministic prompts, and JSON
//! extraction against a [`ResponseSchema`] with one corrective retry.

mod anthropic;
mod client;
mod gemini;
mod json;
mod openai;

use async_trait::async_trait;
use leadscout_shared::{LlmConfig, LlmProviderKind, Result, http, resolve_api_key};

pub use anthropic::AnthropicModel;
pub use client::{LlmClient, Prompt};
pub use gemini::GeminiModel;
pub use json::{ResponseSchema, Shape, clean_json};
pub use openai::OpenAiCompatibleModel;

/// LLM requests can take a while; allow more than the default provider timeout.
const LLM_TIMEOUT_SECS: u64 = 120;

/// One fully-resolved generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
}

/// A single chat-completion vendor.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Vendor name for logs and cache keys (e.g. `anthropic`).
    fn provider(&self) -> &str;

    /// Model id sent to the vendor.
    fn model(&self) -> &str;

    /// Generate a completion and return its text.
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<String>;
}

/// Build the configured vendor model. Fails if the API key env var is unset.
pub fn build_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    let api_key = resolve_api_key(config.api_key_env())?;
    let client = http::build_client(LLM_TIMEOUT_SECS)?;
    let model = config.model().to_string();
    let base_url = config.base_url.clone();

    let built: Box<dyn LanguageModel> = match config.provider {
        LlmProviderKind::Anthropic => Box::new(AnthropicModel::new(
            client,
            api_key,
            model,
            config.max_tokens,
            base_url,
        )),
        LlmProviderKind::OpenAi => Box::new(OpenAiCompatibleModel::openai(
            client,
            api_key,
            model,
            config.max_tokens,
            base_url,
        )),
        LlmProviderKind::OpenRouter => Box::new(OpenAiCompatibleModel::openrouter(
            client,
            api_key,
            model,
            config.max_tokens,
            base_url,
        )),
        LlmProviderKind::Gemini => Box::new(GeminiModel::new(
            client,
            api_key,
            model,
            config.max_tokens,
            base_url,
        )),
    };

    tracing::debug!(provider = built.provider(), model = built.model(), "language model ready");
    Ok(built)
}
