//! Wire adapters for the supported model providers.
//!
//! One module per provider. Variants differ only in transport, auth
//! header, and JSON envelope; the behavioral contract is identical and
//! lives in [`crate::agent::CodeAgent`]. Construction goes through
//! [`crate::factory`], which is the only place that knows which
//! credentials each variant needs.

pub mod anthropic;
pub mod deepseek;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicAgent;
pub use deepseek::DeepSeekAgent;
pub use ollama::OllamaAgent;
pub use openai::OpenAiAgent;

use crate::agent::AgentError;
use reqwest::blocking::Client;
use std::time::Duration;

/// Build a blocking HTTP client with the per-agent timeout installed.
///
/// The timeout covers the whole request round trip; its expiry is the
/// only cancellation mechanism a provider call has.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, AgentError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AgentError::Transport(e.to_string()))
}

/// Map a reqwest failure to the agent error taxonomy.
pub(crate) fn map_transport_error(e: &reqwest::Error, timeout: Duration) -> AgentError {
    if e.is_timeout() {
        AgentError::Timeout(timeout)
    } else {
        AgentError::Transport(e.to_string())
    }
}

/// Pull a structured error message out of a provider error body.
///
/// All three cloud envelopes nest the message under `error.message`;
/// Ollama uses a top-level `error` string. Falls back to the raw body.
pub(crate) fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
