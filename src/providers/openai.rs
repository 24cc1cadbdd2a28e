//! OpenAI chat-completions provider.
//!
//! Bearer-token auth against the chat completions endpoint. Generated
//! text is nested under `choices[0].message.content`; structured errors
//! under `error.message`.

use crate::agent::{AgentError, CodeAgent, GenerateOptions, ProviderKind};
use crate::providers::{build_client, map_transport_error, provider_error_message};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Agent speaking the OpenAI chat completions API
pub struct OpenAiAgent {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiAgent {
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

    /// Unwrap generated text from a chat-completions response body.
    pub(crate) fn unwrap_chat_response(body: &Value) -> Result<String, AgentError> {
        if let Some(message) = body["error"]["message"].as_str() {
            return Err(AgentError::Provider(message.to_string()));
        }
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| {
                AgentError::Transport("response body missing choices[0].message.content".to_string())
            })
    }
}

impl CodeAgent for OpenAiAgent {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, AgentError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "openai generate");

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
        Self::unwrap_chat_response(&body)
    }
}
