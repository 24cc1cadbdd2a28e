//! Local Ollama provider.
//!
//! Plaintext JSON over an unauthenticated local HTTP endpoint. The
//! response carries either a top-level `error` string or the generated
//! text in a `response` field.

use crate::agent::{AgentError, CodeAgent, GenerateOptions, ProviderKind};
use crate::providers::{build_client, map_transport_error, provider_error_message};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Default local endpoint, overridable via `OLLAMA_HOST` / `OLLAMA_PORT`
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 11434;

/// Agent speaking the Ollama generate API
pub struct OllamaAgent {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaAgent {
    /// Create an agent for a local Ollama server.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built.
    pub fn new(model: &str, base_url: &str, timeout: Duration) -> Result<Self, AgentError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    /// Build the request body for `/api/generate`.
    fn build_request_body(&self, prompt: &str, options: &GenerateOptions) -> Value {
        let mut sampling = serde_json::Map::new();
        if let Some(t) = options.temperature {
            sampling.insert("temperature".into(), json!(t));
        }
        if let Some(p) = options.top_p {
            sampling.insert("top_p".into(), json!(p));
        }
        if let Some(n) = options.max_tokens {
            sampling.insert("num_predict".into(), json!(n));
        }

        json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": Value::Object(sampling),
        })
    }

    /// Unwrap the generated text from a response body.
    fn unwrap_response(body: &Value) -> Result<String, AgentError> {
        if let Some(err) = body["error"].as_str() {
            return Err(AgentError::Provider(err.to_string()));
        }
        body["response"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| {
                AgentError::Transport("response body missing 'response' field".to_string())
            })
    }
}

impl CodeAgent for OllamaAgent {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, AgentError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, url = %url, "ollama generate");

        let response = self
            .client
            .post(&url)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> OllamaAgent {
        OllamaAgent::new("llama3.1", "http://127.0.0.1:11434", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_build_request_body() {
        let options = GenerateOptions {
            temperature: Some(0.1),
            top_p: Some(0.9),
            max_tokens: Some(256),
        };
        let body = agent().build_request_body("fix this", &options);

        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["prompt"], "fix this");
        assert_eq!(body["stream"], false);
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(body["options"]["num_predict"], 256);
    }

    #[test]
    fn test_build_request_body_empty_options() {
        let body = agent().build_request_body("hi", &GenerateOptions::default());
        assert!(body["options"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_unwrap_response_text() {
        let body = json!({"response": "fixed code here", "done": true});
        assert_eq!(OllamaAgent::unwrap_response(&body).unwrap(), "fixed code here");
    }

    #[test]
    fn test_unwrap_response_error() {
        let body = json!({"error": "model 'nope' not found"});
        let err = OllamaAgent::unwrap_response(&body).unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_unwrap_response_missing_field() {
        let body = json!({"done": true});
        let err = OllamaAgent::unwrap_response(&body).unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let a = OllamaAgent::new("m", "http://localhost:11434/", Duration::from_secs(1)).unwrap();
        assert_eq!(a.base_url, "http://localhost:11434");
    }
}
