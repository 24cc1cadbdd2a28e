//! Multi-provider comparison orchestration.
//!
//! Runs one problem set against several providers in sequence. A
//! provider that cannot be constructed or fails its connection probe is
//! recorded as a placeholder entry and never blocks the others.

use crate::agent::ProviderKind;
use crate::evaluator::{Evaluator, EvaluatorConfig};
use crate::factory::{create_validated_agent, AgentOptions};
use crate::problem::Problem;
use crate::report::{ComparisonReport, ProviderEntry};
use tracing::{info, warn};

/// Drives batch evaluation across providers with shared settings
pub struct ComparisonRunner {
    agent_options: AgentOptions,
    evaluator_config: EvaluatorConfig,
}

impl Default for ComparisonRunner {
    fn default() -> Self {
        Self::new(AgentOptions::default(), EvaluatorConfig::default())
    }
}

impl ComparisonRunner {
    /// Create a runner with explicit agent and evaluator settings
    #[must_use]
    pub fn new(agent_options: AgentOptions, evaluator_config: EvaluatorConfig) -> Self {
        Self {
            agent_options,
            evaluator_config,
        }
    }

    /// Evaluate the problem set against each provider in turn.
    ///
    /// Providers run in the given order; each gets a fresh agent and a
    /// fresh evaluator so results never bleed across providers.
    #[must_use]
    pub fn compare(&self, providers: &[ProviderKind], problems: &[Problem]) -> ComparisonReport {
        let entries = providers
            .iter()
            .map(|&provider| self.run_provider(provider, problems))
            .collect();
        ComparisonReport::from_entries(entries)
    }

    fn run_provider(&self, provider: ProviderKind, problems: &[Problem]) -> ProviderEntry {
        info!(provider = %provider, "starting provider run");

        let agent = match create_validated_agent(provider, &self.agent_options) {
            Ok(agent) => agent,
            Err(e) => {
                warn!(provider = %provider, error = %e, "provider setup failed");
                return ProviderEntry::failed(provider.as_str(), e.to_string());
            }
        };

        if !agent.test_connection() {
            warn!(provider = %provider, "connection probe failed");
            return ProviderEntry::failed(
                provider.as_str(),
                "Transport error: connection probe failed".to_string(),
            );
        }

        let mut evaluator = Evaluator::with_config(agent, self.evaluator_config.clone());
        evaluator.evaluate_batch(problems);

        let report = evaluator.generate_report();
        info!(
            provider = %provider,
            success_rate = %report.summary.success_rate,
            "provider run complete"
        );
        ProviderEntry::completed(provider.as_str(), report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-wide; tests that mutate credentials must not
    // overlap with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_missing_credentials_yield_placeholder_entry() {
        let _guard = ENV_LOCK.lock().unwrap();
        // No network call happens: validation fails before construction.
        std::env::remove_var("OPENAI_API_KEY");

        let runner = ComparisonRunner::default();
        let comparison = runner.compare(&[ProviderKind::OpenAi], &[]);

        assert_eq!(comparison.providers.len(), 1);
        let entry = &comparison.providers[0];
        assert_eq!(entry.provider, "openai");
        assert_eq!(entry.success_rate, "0%");
        assert!(entry.error.as_deref().unwrap().contains("OPENAI_API_KEY"));
        assert!(comparison.performance_ranking.is_empty());
        assert!(comparison.best_performer.is_none());
    }

    #[test]
    fn test_entries_follow_requested_provider_order() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("DEEPSEEK_API_KEY");

        let runner = ComparisonRunner::default();
        let comparison = runner.compare(&[ProviderKind::DeepSeek, ProviderKind::OpenAi], &[]);

        let names: Vec<&str> = comparison
            .providers
            .iter()
            .map(|e| e.provider.as_str())
            .collect();
        assert_eq!(names, vec!["deepseek", "openai"]);
    }
}
