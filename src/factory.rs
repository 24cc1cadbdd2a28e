//! Validated agent construction.
//!
//! The factory is the only component that knows which environment
//! variables, default models, and model allow-lists belong to each
//! provider. [`create_validated_agent`] is the entry point orchestration
//! code uses: it guarantees no network call is ever attempted with an
//! agent known in advance to be misconfigured.

use crate::agent::{AgentError, CodeAgent, ProviderKind};
use crate::providers::{ollama, AnthropicAgent, DeepSeekAgent, OllamaAgent, OpenAiAgent};
use std::time::Duration;
use thiserror::Error;

/// Errors raised before any network call is made.
///
/// Display strings lead with `Configuration error:` so the report error
/// histogram groups them under one key.
#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("Configuration error: unsupported provider {0:?}")]
    UnsupportedProvider(String),

    #[error("Configuration error: {provider} missing environment variables: {}", missing.join(", "))]
    MissingCredentials {
        provider: ProviderKind,
        missing: Vec<String>,
    },

    #[error("Configuration error: model {model:?} not valid for {provider} (allowed: {})", allowed.join(", "))]
    InvalidModel {
        provider: ProviderKind,
        model: String,
        allowed: Vec<&'static str>,
    },

    #[error("Configuration error: {0}")]
    Construction(#[from] AgentError),
}

/// Default wall-clock budget for one provider call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const DEEPSEEK_KEY_VAR: &str = "DEEPSEEK_API_KEY";

const OLLAMA_MODELS: &[&str] = &[
    "llama3.1",
    "llama3.2",
    "codellama",
    "qwen2.5-coder",
    "deepseek-coder-v2",
];
const OPENAI_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"];
const ANTHROPIC_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
];
const DEEPSEEK_MODELS: &[&str] = &["deepseek-chat", "deepseek-coder", "deepseek-reasoner"];

/// Options for agent construction
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Model identifier; the per-provider default is used when absent
    pub model: Option<String>,
    /// Maximum wall-clock duration for one request
    pub timeout: Duration,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            model: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Structured environment-validation verdict; never an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvCheck {
    /// True when every required credential is present
    pub valid: bool,
    /// Names of the absent environment variables
    pub missing: Vec<String>,
}

/// Environment variables a provider requires
const fn required_env_vars(provider: ProviderKind) -> &'static [&'static str] {
    match provider {
        ProviderKind::Ollama => &[],
        ProviderKind::OpenAi => &[OPENAI_KEY_VAR],
        ProviderKind::Anthropic => &[ANTHROPIC_KEY_VAR],
        ProviderKind::DeepSeek => &[DEEPSEEK_KEY_VAR],
    }
}

/// Check that all credentials a provider needs are present.
#[must_use]
pub fn validate_environment(provider: ProviderKind) -> EnvCheck {
    let missing: Vec<String> = required_env_vars(provider)
        .iter()
        .filter(|var| std::env::var(var).map_or(true, |v| v.trim().is_empty()))
        .map(ToString::to_string)
        .collect();

    EnvCheck {
        valid: missing.is_empty(),
        missing,
    }
}

/// Static model allow-list for a provider
#[must_use]
pub const fn allowed_models(provider: ProviderKind) -> &'static [&'static str] {
    match provider {
        ProviderKind::Ollama => OLLAMA_MODELS,
        ProviderKind::OpenAi => OPENAI_MODELS,
        ProviderKind::Anthropic => ANTHROPIC_MODELS,
        ProviderKind::DeepSeek => DEEPSEEK_MODELS,
    }
}

/// Check a model id against the provider's allow-list.
#[must_use]
pub fn is_valid_provider_model(provider: ProviderKind, model: &str) -> bool {
    allowed_models(provider).contains(&model)
}

/// Per-provider default model
#[must_use]
pub const fn default_model(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::Ollama => "llama3.1",
        ProviderKind::OpenAi => "gpt-4o-mini",
        ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
        ProviderKind::DeepSeek => "deepseek-chat",
    }
}

/// Parse a provider tag string.
///
/// # Errors
///
/// Returns `UnsupportedProvider` for unknown tags.
pub fn parse_provider(tag: &str) -> Result<ProviderKind, FactoryError> {
    tag.parse().map_err(FactoryError::UnsupportedProvider)
}

fn require_env(provider: ProviderKind, var: &str) -> Result<String, FactoryError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FactoryError::MissingCredentials {
            provider,
            missing: vec![var.to_string()],
        })
}

/// Base URL for the local Ollama server, honoring env overrides.
fn ollama_base_url() -> String {
    let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| ollama::DEFAULT_HOST.to_string());
    // A full URL in OLLAMA_HOST wins over host/port assembly.
    if host.starts_with("http://") || host.starts_with("https://") {
        return host;
    }
    let port = std::env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(ollama::DEFAULT_PORT);
    format!("http://{host}:{port}")
}

/// Construct the agent variant matching a provider tag.
///
/// Pure dispatch; no environment validation beyond credential lookup.
/// Use [`create_validated_agent`] from orchestration code.
///
/// # Errors
///
/// Returns `MissingCredentials` when a cloud credential is absent, or
/// `Construction` if the HTTP client cannot be built.
pub fn create_agent(
    provider: ProviderKind,
    options: &AgentOptions,
) -> Result<Box<dyn CodeAgent>, FactoryError> {
    let model = options
        .model
        .clone()
        .unwrap_or_else(|| default_model(provider).to_string());
    let timeout = options.timeout;

    let agent: Box<dyn CodeAgent> = match provider {
        ProviderKind::Ollama => {
            Box::new(OllamaAgent::new(&model, &ollama_base_url(), timeout)?)
        }
        ProviderKind::OpenAi => {
            let key = require_env(provider, OPENAI_KEY_VAR)?;
            Box::new(OpenAiAgent::new(&model, key, timeout)?)
        }
        ProviderKind::Anthropic => {
            let key = require_env(provider, ANTHROPIC_KEY_VAR)?;
            Box::new(AnthropicAgent::new(&model, key, timeout)?)
        }
        ProviderKind::DeepSeek => {
            let key = require_env(provider, DEEPSEEK_KEY_VAR)?;
            Box::new(DeepSeekAgent::new(&model, key, timeout)?)
        }
    };

    Ok(agent)
}

/// Validate environment and model, then construct the agent.
///
/// Fails fast with the missing-variable list if the environment is
/// incomplete, fills in the per-provider default model when none is
/// given, and rejects models outside the allow-list before any network
/// call is attempted.
///
/// # Errors
///
/// `MissingCredentials`, `InvalidModel`, or any `create_agent` failure.
pub fn create_validated_agent(
    provider: ProviderKind,
    options: &AgentOptions,
) -> Result<Box<dyn CodeAgent>, FactoryError> {
    let check = validate_environment(provider);
    if !check.valid {
        return Err(FactoryError::MissingCredentials {
            provider,
            missing: check.missing,
        });
    }

    let resolved = AgentOptions {
        model: Some(
            options
                .model
                .clone()
                .unwrap_or_else(|| default_model(provider).to_string()),
        ),
        timeout: options.timeout,
    };

    let model = resolved.model.as_deref().unwrap_or_default();
    if !is_valid_provider_model(provider, model) {
        return Err(FactoryError::InvalidModel {
            provider,
            model: model.to_string(),
            allowed: allowed_models(provider).to_vec(),
        });
    }

    create_agent(provider, &resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_environment_ollama_needs_nothing() {
        let check = validate_environment(ProviderKind::Ollama);
        assert!(check.valid);
        assert!(check.missing.is_empty());
    }

    #[test]
    fn test_default_models_pass_allow_list() {
        for provider in ProviderKind::ALL {
            assert!(is_valid_provider_model(provider, default_model(provider)));
        }
    }

    #[test]
    fn test_is_valid_provider_model_rejects_cross_provider() {
        assert!(!is_valid_provider_model(ProviderKind::OpenAi, "deepseek-chat"));
        assert!(!is_valid_provider_model(ProviderKind::Anthropic, "gpt-4o"));
    }

    #[test]
    fn test_parse_provider_unknown_tag() {
        let err = parse_provider("watson").unwrap_err();
        assert!(matches!(err, FactoryError::UnsupportedProvider(_)));
        assert!(err.to_string().starts_with("Configuration error:"));
    }

    #[test]
    fn test_create_validated_agent_invalid_model() {
        let options = AgentOptions {
            model: Some("gpt-4o".to_string()),
            ..AgentOptions::default()
        };
        let err = create_validated_agent(ProviderKind::Ollama, &options)
            .err()
            .unwrap();
        match err {
            FactoryError::InvalidModel { model, allowed, .. } => {
                assert_eq!(model, "gpt-4o");
                assert!(!allowed.is_empty());
            }
            other => panic!("expected InvalidModel, got {other}"),
        }
    }

    #[test]
    fn test_create_validated_agent_fills_default_model() {
        // Ollama needs no credentials, so construction succeeds offline.
        let agent =
            create_validated_agent(ProviderKind::Ollama, &AgentOptions::default()).unwrap();
        assert_eq!(agent.model(), default_model(ProviderKind::Ollama));
        assert_eq!(agent.provider(), ProviderKind::Ollama);
    }

    #[test]
    fn test_missing_credentials_error_names_variable() {
        let err = FactoryError::MissingCredentials {
            provider: ProviderKind::OpenAi,
            missing: vec![OPENAI_KEY_VAR.to_string()],
        };
        assert!(err.to_string().contains("OPENAI_API_KEY"));
        assert!(err.to_string().starts_with("Configuration error:"));
    }

    #[test]
    fn test_ollama_base_url_default() {
        if std::env::var("OLLAMA_HOST").is_err() && std::env::var("OLLAMA_PORT").is_err() {
            assert_eq!(ollama_base_url(), "http://127.0.0.1:11434");
        }
    }

    #[test]
    fn test_allowed_models_nonempty() {
        for provider in ProviderKind::ALL {
            assert!(!allowed_models(provider).is_empty());
        }
    }
}
