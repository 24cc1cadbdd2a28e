//! # Repair Eval
//!
//! Evaluation harness measuring whether language models can repair small
//! buggy Python programs. Models are reached through interchangeable
//! provider adapters (a local Ollama server plus the OpenAI, Anthropic,
//! and DeepSeek APIs) behind one [`CodeAgent`] contract.
//!
//! ## Pipeline
//!
//! ```text
//! Problem (buggy Python + statement + test cases)
//!        ↓
//! analyze_code (provider adapter)
//!        ↓
//! extract_fixed_code (three-tier heuristic)
//!        ↓
//! generate_patch (informational unified diff)
//!        ↓
//! python -m py_compile (syntax gate)
//!        ↓
//! per-test subprocess execution (sentinel on stdout)
//!        ↓
//! verdict → EvaluationResult → Report
//! ```
//!
//! Batch mode runs a problem set against one provider; comparison mode
//! runs it against several and ranks them by success rate. Ground truth
//! is always execution of the candidate fix, never patch-text inspection.

pub mod agent;
pub mod comparison;
pub mod evaluator;
pub mod extract;
pub mod factory;
pub mod problem;
pub mod providers;
pub mod report;

pub use agent::{AgentError, CodeAgent, GenerateOptions, ProviderKind};
pub use comparison::ComparisonRunner;
pub use evaluator::{
    EvalError, EvaluationResult, Evaluator, EvaluatorConfig, TestResult, TEST_SENTINEL,
};
pub use extract::{extract_fixed_code, ExtractionError};
pub use factory::{
    allowed_models, create_agent, create_validated_agent, default_model, is_valid_provider_model,
    parse_provider, validate_environment, AgentOptions, EnvCheck, FactoryError, DEFAULT_TIMEOUT,
};
pub use problem::{load_problems, parse_problems, Problem, ProblemError};
pub use providers::{AnthropicAgent, DeepSeekAgent, OllamaAgent, OpenAiAgent};
pub use report::{
    format_success_rate, ComparisonReport, ProviderEntry, RankingEntry, Report, ReportError,
    ReportSummary,
};
