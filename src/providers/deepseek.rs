//! DeepSeek provider.
//!
//! OpenAI-shaped chat completions at the DeepSeek host with bearer auth;
//! only the base URL and model families differ from the OpenAI variant,
//! so response unwrapping is shared.

use crate::agent::{AgentError, CodeAgent, GenerateOptions, ProviderKind};
use crate::providers::openai::OpenAiAgent;
use crate::providers::{build_client, map_transport_error, provider_error_message};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Agent speaking the DeepSeek chat completions API
pub struct DeepSeekAgent {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl DeepSeekAgent {
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
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = options.top_p {
            body["top_p"] = json!(p);
        }
        if let Some(n) = options.max_tokens {
            body["max_tokens"] = json!(n);
        }
        body
    }
}

impl CodeAgent for DeepSeekAgent {
    fn provider(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, AgentError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "deepseek generate");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
        OpenAiAgent::unwrap_chat_response(&body)
    }
}
