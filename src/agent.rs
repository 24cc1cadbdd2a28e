//! Provider-agnostic agent contract.
//!
//! Every model provider implements the same four-method capability
//! surface: `generate`, `test_connection`, `analyze_code`,
//! `generate_patch`. Callers hold a `Box<dyn CodeAgent>` and never learn
//! provider identity beyond its tag, so adding a provider means
//! implementing `generate` plus the construction metadata — the analysis
//! and patch wrappers are provided methods with pinned temperatures.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a provider call.
///
/// Display strings lead with a stable `Kind:` prefix because the report
/// error histogram keys on the text before the first colon.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Structured error reported by the remote side
    #[error("Provider error: {0}")]
    Provider(String),

    /// Network-level failure before a response arrived
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response within the configured timeout
    #[error("Timeout: no response after {0:?}")]
    Timeout(Duration),
}

/// Provider tag, distinguishing wire format only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Local unauthenticated HTTP (Ollama)
    Ollama,
    /// OpenAI chat completions, bearer auth
    OpenAi,
    /// Anthropic messages API, x-api-key auth
    Anthropic,
    /// DeepSeek OpenAI-shaped chat completions, bearer auth
    DeepSeek,
}

impl ProviderKind {
    /// All supported providers, in canonical listing order
    pub const ALL: [Self; 4] = [Self::Ollama, Self::OpenAi, Self::Anthropic, Self::DeepSeek];

    /// Canonical string tag
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::DeepSeek => "deepseek",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "deepseek" => Ok(Self::DeepSeek),
            other => Err(other.to_string()),
        }
    }
}

/// Named per-call overrides for `generate`
///
/// Only these three knobs exist; there is no free-form pass-through.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus-sampling threshold
    pub top_p: Option<f32>,
    /// Maximum output length in tokens
    pub max_tokens: Option<u32>,
}

impl GenerateOptions {
    /// Near-deterministic settings for code analysis
    #[must_use]
    pub fn analysis() -> Self {
        Self {
            temperature: Some(0.1),
            top_p: None,
            max_tokens: Some(2048),
        }
    }

    /// Fully deterministic settings for patch generation
    #[must_use]
    pub fn patch() -> Self {
        Self {
            temperature: Some(0.0),
            top_p: None,
            max_tokens: Some(1024),
        }
    }
}

/// Uniform capability surface over one model provider.
///
/// Implementations are stateless per call; model, timeout, and credential
/// are fixed at construction. `generate` never retries internally —
/// retry policy belongs to the caller.
pub trait CodeAgent: Send {
    /// Provider tag for this agent
    fn provider(&self) -> ProviderKind;

    /// Model identifier this agent was constructed with
    fn model(&self) -> &str;

    /// Send one prompt and return the generated text.
    ///
    /// # Errors
    ///
    /// `Provider` when the remote side reports a structured error,
    /// `Transport` on network failure, `Timeout` when no response
    /// arrives within the configured timeout.
    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, AgentError>;

    /// Probe connectivity with a minimal generate call.
    ///
    /// Returns false rather than an error on any failure; the cause is
    /// logged for the operator. Connectivity probing must never crash
    /// the caller.
    fn test_connection(&self) -> bool {
        let options = GenerateOptions {
            temperature: Some(0.0),
            top_p: None,
            max_tokens: Some(8),
        };
        match self.generate("Reply with the single word: ok", &options) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    provider = %self.provider(),
                    model = %self.model(),
                    error = %e,
                    "connection test failed"
                );
                false
            }
        }
    }

    /// Ask the model to diagnose buggy code and produce a fix.
    ///
    /// The response is required to contain an `ANALYSIS:` section, a
    /// fenced code block under a `FIXED_CODE:` label, and an
    /// `EXPLANATION:` section. Temperature is pinned low for
    /// reproducibility.
    ///
    /// # Errors
    ///
    /// Propagates any `generate` failure.
    fn analyze_code(&self, code: &str, problem_statement: &str) -> Result<String, AgentError> {
        let prompt = build_analysis_prompt(code, problem_statement);
        self.generate(&prompt, &GenerateOptions::analysis())
    }

    /// Ask the model for a unified diff between original and fixed code.
    ///
    /// The patch text is informational; verdicts depend on the extracted
    /// fix, never on this diff. Temperature is pinned to zero.
    ///
    /// # Errors
    ///
    /// Propagates any `generate` failure.
    fn generate_patch(
        &self,
        original: &str,
        fixed: &str,
        filename: &str,
    ) -> Result<String, AgentError> {
        let prompt = build_patch_prompt(original, fixed, filename);
        self.generate(&prompt, &GenerateOptions::patch())
    }
}

/// Fixed instruction template for the analysis step
#[must_use]
pub fn build_analysis_prompt(code: &str, problem_statement: &str) -> String {
    format!(
        "You are an expert Python developer. The code below contains a bug.\n\
         Diagnose it and produce a complete corrected version.\n\n\
         Problem description:\n{problem_statement}\n\n\
         Buggy code:\n```python\n{code}\n```\n\n\
         Respond in exactly this format:\n\n\
         ANALYSIS:\n\
         <brief root-cause diagnosis>\n\n\
         FIXED_CODE:\n\
         ```python\n\
         <the complete corrected source file>\n\
         ```\n\n\
         EXPLANATION:\n\
         <brief description of the change>"
    )
}

/// Fixed instruction template for the patch step
#[must_use]
pub fn build_patch_prompt(original: &str, fixed: &str, filename: &str) -> String {
    format!(
        "Produce a unified diff that transforms the original file into the fixed file.\n\
         Respond with only the diff and no other text, starting with:\n\
         --- a/{filename}\n\
         +++ b/{filename}\n\n\
         Original ({filename}):\n```python\n{original}\n```\n\n\
         Fixed ({filename}):\n```python\n{fixed}\n```"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trip() {
        for kind in ProviderKind::ALL {
            let parsed: ProviderKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_provider_kind_parse_case_insensitive() {
        let parsed: ProviderKind = "OpenAI".parse().unwrap();
        assert_eq!(parsed, ProviderKind::OpenAi);
    }

    #[test]
    fn test_provider_kind_parse_unknown() {
        let result = ProviderKind::from_str("mistral");
        assert_eq!(result.unwrap_err(), "mistral");
    }

    #[test]
    fn test_analysis_options_pinned_low() {
        let options = GenerateOptions::analysis();
        assert!(options.temperature.unwrap() <= 0.2);
    }

    #[test]
    fn test_patch_options_deterministic() {
        let options = GenerateOptions::patch();
        assert!(options.temperature.unwrap().abs() < f32::EPSILON);
    }

    #[test]
    fn test_analysis_prompt_contains_labels() {
        let prompt = build_analysis_prompt("def f(): pass", "f does nothing");
        assert!(prompt.contains("ANALYSIS:"));
        assert!(prompt.contains("FIXED_CODE:"));
        assert!(prompt.contains("EXPLANATION:"));
        assert!(prompt.contains("def f(): pass"));
        assert!(prompt.contains("f does nothing"));
    }

    #[test]
    fn test_patch_prompt_names_file() {
        let prompt = build_patch_prompt("a = 1", "a = 2", "calc.py");
        assert!(prompt.contains("--- a/calc.py"));
        assert!(prompt.contains("+++ b/calc.py"));
    }

    #[test]
    fn test_agent_error_display_prefixes() {
        let err = AgentError::Provider("model overloaded".to_string());
        assert!(err.to_string().starts_with("Provider error:"));

        let err = AgentError::Transport("connection refused".to_string());
        assert!(err.to_string().starts_with("Transport error:"));

        let err = AgentError::Timeout(Duration::from_secs(30));
        assert!(err.to_string().starts_with("Timeout:"));
        assert!(err.to_string().contains("30"));
    }
}
