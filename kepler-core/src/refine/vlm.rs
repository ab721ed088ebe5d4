//! Visual-semantic validation via a vision-language model.
//!
//! The VLM describes the rendered diagram and diffs the description against
//! the problem text. Pluggable like the LLM providers; without credentials a
//! stub returns a neutral verdict with a warning.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::KeplerConfig;
use crate::error::Result;
use crate::llm::{ChatMessage, LlmProvider, OpenAiProvider, StubProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlmValidation {
    pub is_valid: bool,
    pub confidence: f64,
    pub description: String,
    #[serde(default)]
    pub discrepancies: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[async_trait::async_trait]
pub trait VlmProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Describe the SVG and compare against the problem text.
    async fn validate(&self, svg: &str, problem_text: &str) -> Result<VlmValidation>;
}

/// VLM backed by a chat model in JSON mode, with a hard per-call timeout.
#[derive(Debug)]
pub struct ChatBackedVlm {
    provider: Box<dyn LlmProvider>,
    timeout: std::time::Duration,
}

impl ChatBackedVlm {
    pub fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self { provider, timeout: std::time::Duration::from_secs(30) }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl VlmProvider for ChatBackedVlm {
    fn name(&self) -> &'static str {
        "chat-backed"
    }

    async fn validate(&self, svg: &str, problem_text: &str) -> Result<VlmValidation> {
        let prompt = format!(
            "You are validating a generated STEM diagram.\n\
             Problem statement:\n{problem_text}\n\n\
             SVG source of the diagram:\n{svg}\n\n\
             Describe what the diagram shows, list discrepancies against the \
             problem statement, and suggest fixes. Reply as JSON with keys: \
             is_valid (bool), confidence (0..1), description (string), \
             discrepancies (string[]), suggestions (string[])."
        );
        let messages = [ChatMessage::user(&prompt)];
        let call = self.provider.chat(&messages, 0.1, true);
        let reply = match tokio::time::timeout(self.timeout, call).await {
            Ok(reply) => reply?,
            Err(_) => {
                return Ok(VlmValidation {
                    is_valid: true,
                    confidence: 0.5,
                    description: String::new(),
                    discrepancies: vec![],
                    suggestions: vec![format!(
                        "visual validation timed out after {}s",
                        self.timeout.as_secs()
                    )],
                });
            }
        };

        debug!(provider = self.provider.name(), "VLM reply received");
        let validation: VlmValidation = serde_json::from_str(&reply).unwrap_or(VlmValidation {
            is_valid: true,
            confidence: 0.5,
            description: reply,
            discrepancies: vec![],
            suggestions: vec!["VLM reply was not valid JSON".to_string()],
        });
        Ok(validation)
    }
}

/// VLM provider from config; missing API key degrades to the stub chat
/// provider, which yields a neutral validation.
pub fn vlm_from_config(config: &KeplerConfig) -> (ChatBackedVlm, Option<String>) {
    let timeout = std::time::Duration::from_secs(config.timeouts.vlm_secs);
    match std::env::var(&config.vlm.api_key_env) {
        Ok(key) if !key.is_empty() => {
            let mut provider = OpenAiProvider::new(key, config.vlm.model.clone());
            if let Some(url) = &config.vlm.base_url {
                provider = provider.with_base_url(url.clone());
            }
            (ChatBackedVlm::new(Box::new(provider)).with_timeout(timeout), None)
        }
        _ => (
            ChatBackedVlm::new(Box::new(StubProvider)).with_timeout(timeout),
            Some(format!(
                "no API key in ${}; visual validation uses the stub",
                config.vlm.api_key_env
            )),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_backed_vlm_returns_neutral_verdict() {
        let vlm = ChatBackedVlm::new(Box::new(StubProvider));
        let validation = vlm.validate("<svg/>", "a capacitor").await.unwrap();
        assert!(validation.is_valid);
        assert!((validation.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn malformed_reply_degrades_gracefully() {
        #[derive(Debug)]
        struct Gibberish;
        #[async_trait::async_trait]
        #[allow(clippy::unnecessary_literal_bound)]
        impl LlmProvider for Gibberish {
            fn name(&self) -> &str {
                "gibberish"
            }
            fn model_id(&self) -> &str {
                "gibberish"
            }
            async fn chat(
                &self,
                _messages: &[ChatMessage],
                _temperature: f64,
                _json_mode: bool,
            ) -> Result<String> {
                Ok("not json at all".to_string())
            }
        }
        let vlm = ChatBackedVlm::new(Box::new(Gibberish));
        let validation = vlm.validate("<svg/>", "text").await.unwrap();
        assert!(validation.is_valid);
        assert!(validation.description.contains("not json"));
        assert!(!validation.suggestions.is_empty());
    }

    #[test]
    fn missing_key_selects_stub() {
        let mut config = KeplerConfig::default();
        config.vlm.api_key_env = "KEPLER_TEST_NO_SUCH_VLM_KEY".to_string();
        let (_, warning) = vlm_from_config(&config);
        assert!(warning.unwrap().contains("stub"));
    }
}
