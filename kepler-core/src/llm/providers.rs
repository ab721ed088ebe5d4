// LLM provider implementations: Anthropic, OpenAI-compatible, and a stub.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KeplerError, LlmError};

use super::{ChatMessage, LlmProvider};

const MAX_TOKENS: u32 = 1024;

// ── Anthropic Provider ──────────────────────────────────────────────

#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        json_mode: bool,
    ) -> crate::error::Result<String> {
        let url = format!("{}/v1/messages", self.base_url);

        // The messages API has no JSON response format; steer via a system
        // prompt instead.
        let mut system = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        if json_mode {
            if !system.is_empty() {
                system.push('\n');
            }
            system.push_str("Respond with a single JSON object and nothing else.");
        }

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature,
            system: (!system.is_empty()).then_some(system),
            messages: messages.iter().filter(|m| m.role != "system").cloned().collect(),
        };

        debug!(model = %self.model, "calling Anthropic API");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| KeplerError::Llm(LlmError::Network(e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(KeplerError::Llm(LlmError::ApiError { status, body: text }));
        }

        let result: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| KeplerError::Llm(LlmError::Parse(e.to_string())))?;

        Ok(result.content.first().map(|c| c.text.clone()).unwrap_or_default())
    }
}

// ── OpenAI-compatible Provider ──────────────────────────────────────

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: "https://api.openai.com".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    content: String,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        json_mode: bool,
    ) -> crate::error::Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = OpenAiRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature,
            messages: messages.to_vec(),
            response_format: json_mode
                .then(|| serde_json::json!({"type": "json_object"})),
        };

        debug!(model = %self.model, "calling OpenAI-compatible API");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| KeplerError::Llm(LlmError::Network(e.to_string())))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(KeplerError::Llm(LlmError::ApiError { status, body: text }));
        }

        let result: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| KeplerError::Llm(LlmError::Parse(e.to_string())))?;

        Ok(result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

// ── Stub Provider ───────────────────────────────────────────────────

/// Neutral stand-in when no credentials are configured. Always succeeds.
#[derive(Debug, Default)]
pub struct StubProvider;

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl LlmProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn model_id(&self) -> &str {
        "stub"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _temperature: f64,
        json_mode: bool,
    ) -> crate::error::Result<String> {
        if json_mode {
            Ok(r#"{"is_valid": true, "confidence": 0.5, "description": "stub provider: no model configured", "discrepancies": [], "suggestions": []}"#.to_string())
        } else {
            Ok("stub provider: no model configured".to_string())
        }
    }
}

// ── Provider Factory ────────────────────────────────────────────────

/// Create an LLM provider from configuration.
pub fn create_provider(
    provider: &str,
    model: &str,
    api_key: &str,
    base_url: Option<&str>,
) -> crate::error::Result<Box<dyn LlmProvider>> {
    match provider {
        "anthropic" => {
            let mut p = AnthropicProvider::new(api_key.to_string(), model.to_string());
            if let Some(url) = base_url {
                p = p.with_base_url(url.to_string());
            }
            Ok(Box::new(p))
        }
        "openai" | "custom" => {
            let mut p = OpenAiProvider::new(api_key.to_string(), model.to_string());
            if let Some(url) = base_url {
                p = p.with_base_url(url.to_string());
            }
            Ok(Box::new(p))
        }
        "stub" => Ok(Box::new(StubProvider)),
        other => Err(KeplerError::Llm(LlmError::Config(format!(
            "Unknown provider: {other}. Use: anthropic, openai, custom, stub"
        )))),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_factory() {
        let p = create_provider("anthropic", "test-model", "key", None).unwrap();
        assert_eq!(p.name(), "anthropic");
        assert_eq!(p.model_id(), "test-model");

        let p = create_provider("openai", "gpt-4o", "key", None).unwrap();
        assert_eq!(p.name(), "openai");

        let p = create_provider("custom", "local-model", "key", Some("http://localhost:8080"));
        assert!(p.is_ok());

        let p = create_provider("invalid", "model", "key", None);
        assert!(p.is_err());
    }

    #[tokio::test]
    async fn stub_json_mode_parses() {
        let reply = StubProvider
            .chat(&[ChatMessage::user("describe")], 0.0, true)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["is_valid"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn stub_plain_mode_is_text() {
        let reply = StubProvider
            .chat(&[ChatMessage::user("describe")], 0.0, false)
            .await
            .unwrap();
        assert!(reply.contains("stub"));
    }
}
