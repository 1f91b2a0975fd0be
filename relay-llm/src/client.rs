use crate::anthropic::{ANTHROPIC_DEFAULT_BASE_URL, AnthropicClient};
use crate::error::{LlmError, Result};
use crate::openai::{OPENAI_DEFAULT_BASE_URL, OpenAiClient};
use crate::types::{ChatMessage, ChatResponse};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl Provider {
    /// `claude-*` models go to Anthropic, everything else to an
    /// OpenAI-compatible endpoint.
    pub fn for_model(model: &str) -> Self {
        if model.trim().to_ascii_lowercase().starts_with("claude-") {
            return Provider::Anthropic;
        }
        Provider::OpenAI
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => OPENAI_DEFAULT_BASE_URL,
            Provider::Anthropic => ANTHROPIC_DEFAULT_BASE_URL,
        }
    }
}

#[derive(Clone)]
pub struct LlmClient {
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(LlmError::InvalidInput("model is required".to_string()));
        }
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidInput(format!(
                "api key is required for model {model}"
            )));
        }
        let provider = Provider::for_model(model);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Ok(Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            api_key: api_key.trim().to_string(),
            model: model.trim().to_string(),
            client,
        })
    }

    /// Point the client at a compatible endpoint (proxies, local servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let trimmed = base_url.trim();
        if !trimmed.is_empty() {
            self.base_url = trimmed.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model, messages = messages.len()))]
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        match self.provider {
            Provider::OpenAI => {
                OpenAiClient::new(self.client.clone(), &self.base_url, &self.api_key, &self.model)
                    .chat(messages)
                    .await
            }
            Provider::Anthropic => {
                AnthropicClient::new(self.client.clone(), &self.base_url, &self.api_key, &self.model)
                    .chat(messages)
                    .await
            }
        }
    }
}
