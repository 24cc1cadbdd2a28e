//! Anthropic messages-API provider.
//!
//! Differs from the OpenAI-shaped envelopes in three ways: auth goes in
//! an `x-api-key` header rather than a bearer token, a fixed
//! `anthropic-version` header is required, and generated text comes back
//! as content blocks under `content[0].text`.

use crate::agent::{AgentError, CodeAgent, GenerateOptions, ProviderKind};
use crate::providers::{build_client, map_transport_error, provider_error_message};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Required API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory in the messages API
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Agent speaking the Anthropic messages API
pub struct AnthropicAgent {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl AnthropicAgent {
    /// Create an agent with an already-resolved API key.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn new(model: &str, api_key: String, timeout: Duration) -> Result<Self, AgentError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: model.to_string(),
            timeout,
        })
    }

    fn build_request_body(&self, prompt: &str, options: &GenerateOptions) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = options.top_p {
            body["top_p"] = json!(p);
        }
        body
    }

    /// Unwrap generated text from a messages-API response body.
    fn unwrap_response(body: &Value) -> Result<String, AgentError> {
        if let Some(message) = body["error"]["message"].as_str() {
            return Err(AgentError::Provider(message.to_string()));
        }
        body["content"][0]["text"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| {
                AgentError::Transport("response body missing content[0].text".to_string())
            })
    }
}

impl CodeAgent for AnthropicAgent {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, AgentError> {
        let url = format!("{}/messages", self.base_url);
        debug!(model = %self.model, "anthropic generate");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_request_body(prompt, options))
            .send()
            .map_err(|e| map_transport_error(&e, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| map_transport_error(&e, self.timeout))?;

        if !status.is_success() {
            return Err(AgentError::Provider(provider_error_message(&text)));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| AgentError::Transport(format!("invalid response JSON: {e}")))?;
        Self::unwrap_response(&body)
    }
}
