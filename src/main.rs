//! Repair Eval CLI
//!
//! Code-repair evaluation harness for LLM providers

use anyhow::Context;
use clap::{Parser, Subcommand};
use repair_eval::{
    allowed_models, create_validated_agent, default_model, load_problems, parse_provider,
    validate_environment, AgentOptions, ComparisonRunner, Evaluator, EvaluatorConfig,
    ProviderKind, DEFAULT_TIMEOUT,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "repair-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a problem set against one provider
    Evaluate {
        /// Problem file (single problem, array, or {"problems": [...]})
        #[arg(long)]
        problems: PathBuf,

        /// Provider tag: ollama, openai, anthropic, deepseek
        #[arg(long, default_value = "ollama")]
        provider: String,

        /// Model identifier (provider default when omitted)
        #[arg(long)]
        model: Option<String>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write the JSON report here
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a problem set against several providers and rank them
    Compare {
        /// Problem file
        #[arg(long)]
        problems: PathBuf,

        /// Provider tags to compare
        #[arg(long, value_delimiter = ',', default_value = "ollama")]
        providers: Vec<String>,

        /// Write the JSON comparison report here
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate credentials and connectivity for a provider
    Check {
        /// Provider tag
        #[arg(long, default_value = "ollama")]
        provider: String,
    },

    /// Show the model allow-list per provider
    ListModels {
        /// Restrict to one provider tag
        #[arg(long)]
        provider: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    match cli.command {
        Commands::Evaluate {
            problems,
            provider,
            model,
            timeout,
            output,
        } => {
            let provider = parse_provider(&provider)?;
            let options = AgentOptions {
                model,
                timeout: timeout.map_or(DEFAULT_TIMEOUT, Duration::from_secs),
            };

            let problem_set = load_problems(&problems)
                .with_context(|| format!("loading problems from {}", problems.display()))?;
            tracing::info!(
                provider = %provider,
                problems = problem_set.len(),
                "starting evaluation"
            );

            let agent = create_validated_agent(provider, &options)?;
            if !agent.test_connection() {
                anyhow::bail!("{provider} connection probe failed");
            }

            let mut evaluator = Evaluator::with_config(agent, EvaluatorConfig::default());
            evaluator.evaluate_batch(&problem_set);

            let report = evaluator.generate_report();
            println!("{}", report.to_text());

            if let Some(path) = output {
                report
                    .save(&path)
                    .with_context(|| format!("saving report to {}", path.display()))?;
                println!("Report written to {}", path.display());
            }
        }
        Commands::Compare {
            problems,
            providers,
            output,
        } => {
            let providers: Vec<ProviderKind> = providers
                .iter()
                .map(|tag| parse_provider(tag))
                .collect::<Result<_, _>>()?;

            let problem_set = load_problems(&problems)
                .with_context(|| format!("loading problems from {}", problems.display()))?;
            tracing::info!(
                providers = providers.len(),
                problems = problem_set.len(),
                "starting comparison"
            );

            let runner = ComparisonRunner::default();
            let comparison = runner.compare(&providers, &problem_set);
            println!("{}", comparison.ranking_table());

            if let Some(path) = output {
                comparison
                    .save(&path)
                    .with_context(|| format!("saving comparison to {}", path.display()))?;
                println!("Comparison written to {}", path.display());
            }
        }
        Commands::Check { provider } => {
            let provider = parse_provider(&provider)?;

            let check = validate_environment(provider);
            if !check.valid {
                println!("Environment: MISSING {}", check.missing.join(", "));
                std::process::exit(1);
            }
            println!("Environment: OK");

            let agent = create_validated_agent(provider, &AgentOptions::default())?;
            if agent.test_connection() {
                println!("Connection:  OK ({})", agent.model());
            } else {
                println!("Connection:  FAILED");
                std::process::exit(1);
            }
        }
        Commands::ListModels { provider } => {
            let selected: Vec<ProviderKind> = match provider {
                Some(tag) => vec![parse_provider(&tag)?],
                None => ProviderKind::ALL.to_vec(),
            };
            for provider in selected {
                println!("{provider}:");
                for model in allowed_models(provider) {
                    let marker = if *model == default_model(provider) {
                        " (default)"
                    } else {
                        ""
                    };
                    println!("  - {model}{marker}");
                }
            }
        }
    }

    Ok(())
}
