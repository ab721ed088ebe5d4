//! LLM provider seam.
//!
//! Pluggable across providers; missing credentials select a stub that
//! returns a neutral result with a warning instead of failing the request.

pub mod providers;

use serde::{Deserialize, Serialize};

use crate::config::KeplerConfig;
use crate::error::Result;

pub use providers::{create_provider, AnthropicProvider, OpenAiProvider, StubProvider};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self { role: "user".to_string(), content: content.to_string() }
    }

    pub fn system(content: &str) -> Self {
        Self { role: "system".to_string(), content: content.to_string() }
    }
}

/// Common interface for LLM providers.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// The model ID being used.
    fn model_id(&self) -> &str;

    /// Chat completion. With `json_mode` the provider is asked to return a
    /// single JSON object (enforced natively where the API supports it).
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        json_mode: bool,
    ) -> Result<String>;
}

/// Provider from config; missing API key degrades to the stub.
/// Returns the provider and an optional warning explaining the downgrade.
pub fn provider_from_config(
    config: &KeplerConfig,
) -> (Box<dyn LlmProvider>, Option<String>) {
    match std::env::var(&config.llm.api_key_env) {
        Ok(key) if !key.is_empty() => {
            match create_provider(
                &config.llm.provider,
                &config.llm.model,
                &key,
                config.llm.base_url.as_deref(),
            ) {
                Ok(provider) => (provider, None),
                Err(e) => (
                    Box::new(StubProvider::default()),
                    Some(format!("LLM provider unavailable ({e}); using stub")),
                ),
            }
        }
        _ => (
            Box::new(StubProvider::default()),
            Some(format!(
                "no API key in ${}; LLM calls return neutral stub results",
                config.llm.api_key_env
            )),
        ),
    }
}
