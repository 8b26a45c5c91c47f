//! CLI command definitions for prompt-forge.
//!
//! `evaluate` scores a prompt on a dataset; `optimize` runs the local
//! prompt optimization loop and prints a before/after summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::config::{ClientConfig, OptimizerConfig, RoundFailurePolicy};
use crate::dataset::{load_dataset, Dataset, DatasetFormat};
use crate::llm::{CompletionClient, LiteLlmClient, ModelRole, RoleRoutedClient};
use crate::matcher::{AnsTagMatcher, AnswerMatcher};
use crate::metrics;
use crate::optimizer::{
    EvaluationResult, Evaluator, LocalPromptOptimizer, OptimizationReport, PromptScorer,
    RoundOutcome,
};
use crate::prompt::Prompt;

/// Prompt used when none is given on the command line.
const DEFAULT_PROMPT: &str =
    "Please answer the following question. Put ONLY the final answer in <ans>...</ans> tags.";

/// Examples used for optimization when `--limit` is not given.
const DEFAULT_OPTIMIZE_LIMIT: usize = 20;

/// Local prompt optimizer for LLM task prompts.
#[derive(Parser)]
#[command(name = "prompt-forge")]
#[command(about = "Optimize LLM task prompts with localized, failure-driven edits")]
#[command(version)]
#[command(
    long_about = "prompt-forge scores a prompt on a labeled dataset, asks an optimizer model to mark the tokens responsible for failures, rewrites only those tokens and keeps the best-scoring prompt.\n\nExample usage:\n  prompt-forge optimize --dataset boolean_expressions.json --max-rounds 3"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Score a prompt on a dataset.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Optimize a prompt on a dataset.
    #[command(alias = "opt")]
    Optimize(OptimizeArgs),
}

/// Dataset selection shared by all commands.
#[derive(clap::Args, Debug)]
pub struct DatasetArgs {
    /// Path to the dataset JSON file.
    #[arg(short = 'd', long)]
    pub dataset: PathBuf,

    /// Dataset layout: bbh ({"examples":[{input,target}]}) or math ([{question,answer}]).
    #[arg(short = 'f', long, default_value = "bbh")]
    pub format: DatasetFormat,

    /// Prompt text to score or optimize.
    #[arg(short = 'p', long, default_value = DEFAULT_PROMPT)]
    pub prompt: String,
}

/// Model connection overrides. Unset values come from [`ClientConfig::from_env`].
#[derive(clap::Args, Debug)]
pub struct ClientArgs {
    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "LPO_API_BASE")]
    pub api_base: Option<String>,

    /// API key (OPENAI_API_KEY is used when neither is set).
    #[arg(long, env = "LPO_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model answering dataset questions.
    #[arg(long, env = "LPO_TASK_MODEL")]
    pub task_model: Option<String>,

    /// Model tagging and rewriting the prompt.
    #[arg(long, env = "LPO_OPTIMIZER_MODEL")]
    pub optimizer_model: Option<String>,
}

/// Arguments for `prompt-forge evaluate`.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub data: DatasetArgs,

    #[command(flatten)]
    pub client: ClientArgs,

    /// Only use the first N examples.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Task completions in flight (defaults to LPO_EVAL_CONCURRENCY, then 1).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print the first K examples with the model's raw response.
    #[arg(long, default_value_t = 0)]
    pub show_samples: usize,

    /// Output JSON to stdout instead of a summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `prompt-forge optimize`.
#[derive(Parser, Debug)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub data: DatasetArgs,

    #[command(flatten)]
    pub client: ClientArgs,

    /// Only use the first N examples.
    #[arg(short = 'n', long, default_value_t = DEFAULT_OPTIMIZE_LIMIT)]
    pub limit: usize,

    /// Maximum optimization rounds.
    #[arg(short = 'r', long)]
    pub max_rounds: Option<usize>,

    /// YAML file with optimizer settings.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// What to do when a round fails: skip or abort.
    #[arg(long)]
    pub policy: Option<RoundFailurePolicy>,

    /// Task completions in flight during evaluation.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print the first K examples with the model's raw response, before and after.
    #[arg(long, default_value_t = 0)]
    pub show_samples: usize,

    /// Output the optimization report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub metrics: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Evaluate(args) => run_evaluate_command(args).await,
        Commands::Optimize(args) => run_optimize_command(args).await,
    }
}

// ============================================================================
// Shared setup
// ============================================================================

/// Merge `LPO_*` settings with command-line overrides.
fn client_config(args: &ClientArgs) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env()?;

    if let Some(api_base) = &args.api_base {
        config.api_base = api_base.clone();
    }
    if let Some(api_key) = &args.api_key {
        config.api_key = Some(api_key.clone());
    }
    if let Some(model) = &args.task_model {
        config.task_model = model.clone();
    }
    if let Some(model) = &args.optimizer_model {
        config.optimizer_model = model.clone();
    }

    config.validate()?;
    Ok(config)
}

fn build_client(config: &ClientConfig) -> anyhow::Result<Arc<dyn CompletionClient>> {
    let provider = LiteLlmClient::new(
        config.api_base.clone(),
        config.api_key.clone(),
        config.optimizer_model.clone(),
    )?
    .with_max_attempts(config.max_attempts);

    info!(
        api_base = %provider.api_base(),
        default_model = %provider.default_model(),
        has_api_key = provider.has_api_key(),
        max_attempts = provider.max_attempts(),
        task_model = %config.task_model,
        "Initialized completion client"
    );

    Ok(Arc::new(RoleRoutedClient::shared(
        Arc::new(provider),
        config.task_model.clone(),
        config.optimizer_model.clone(),
    )))
}

fn load(args: &DatasetArgs, limit: Option<usize>) -> anyhow::Result<Dataset> {
    let dataset = load_dataset(&args.dataset, args.format)?;
    let loaded = dataset.len();
    let dataset = match limit {
        Some(n) => dataset.limit(n),
        None => dataset,
    };

    info!(
        path = %args.dataset.display(),
        loaded,
        used = dataset.len(),
        "Loaded dataset"
    );
    Ok(dataset)
}

/// Print the first `count` examples with the raw task response.
async fn show_samples(
    client: &dyn CompletionClient,
    prompt: &Prompt,
    dataset: &Dataset,
    count: usize,
    temperature: Option<f64>,
) -> anyhow::Result<()> {
    let matcher = AnsTagMatcher;
    let mut correct = 0;
    let shown = dataset.limit(count);

    println!("\n--- Samples ({}) ---", shown.len());
    for (i, example) in shown.iter().enumerate() {
        let response = client
            .complete(ModelRole::Task, &prompt.apply_to(&example.input), temperature)
            .await?;
        let ok = matcher.matches(&response, &example.target);
        if ok {
            correct += 1;
        }
        println!("[{}] {}", i + 1, if ok { "correct" } else { "wrong" });
        println!("  Input:    {}", example.input);
        println!("  Response: {}", response);
        println!("  Expected: {}", example.target);
    }
    if !shown.is_empty() {
        println!("Sample accuracy: {}/{}", correct, shown.len());
    }
    Ok(())
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

// ============================================================================
// evaluate
// ============================================================================

/// Task-side settings for `evaluate`: `LPO_*` values with flag overrides.
fn evaluate_config(args: &EvaluateArgs, base: OptimizerConfig) -> anyhow::Result<OptimizerConfig> {
    let config = match args.concurrency {
        Some(concurrency) => base.with_eval_concurrency(concurrency),
        None => base,
    };
    config.validate()?;
    Ok(config)
}

async fn run_evaluate_command(args: EvaluateArgs) -> anyhow::Result<()> {
    let config = evaluate_config(&args, OptimizerConfig::from_env()?)?;
    let client = build_client(&client_config(&args.client)?)?;
    let dataset = load(&args.data, args.limit)?;
    let prompt = Prompt::new(args.data.prompt.clone());

    if args.show_samples > 0 && !args.json {
        show_samples(
            client.as_ref(),
            &prompt,
            &dataset,
            args.show_samples,
            config.task_temperature,
        )
        .await?;
    }

    let evaluator = Evaluator::new(client)
        .with_concurrency(config.eval_concurrency)
        .with_temperature(config.task_temperature);
    let started = Instant::now();
    let result = evaluator.evaluate(&prompt, &dataset).await?;
    let elapsed = started.elapsed().as_secs_f64();

    if args.json {
        let output = EvaluateOutput {
            prompt: &prompt,
            elapsed_secs: elapsed,
            result: &result,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("\n=== Evaluation ===");
    println!("Prompt:   '{}'", prompt);
    println!("Correct:  {}/{}", result.correct, result.total);
    println!("Accuracy: {}", percent(result.accuracy));
    println!("Elapsed:  {:.2}s", elapsed);
    Ok(())
}

#[derive(Serialize)]
struct EvaluateOutput<'a> {
    prompt: &'a Prompt,
    elapsed_secs: f64,
    result: &'a EvaluationResult,
}

// ============================================================================
// optimize
// ============================================================================

fn optimizer_config(args: &OptimizeArgs) -> anyhow::Result<OptimizerConfig> {
    // Precedence: defaults < YAML file < LPO_* variables < flags.
    let mut config = match &args.config {
        Some(path) => OptimizerConfig::from_yaml_file(path)?,
        None => OptimizerConfig::default(),
    }
    .with_env_overrides()?;

    if let Some(rounds) = args.max_rounds {
        config = config.with_max_rounds(rounds);
    }
    if let Some(policy) = args.policy {
        config = config.with_failure_policy(policy);
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_eval_concurrency(concurrency);
    }

    config.validate()?;
    Ok(config)
}

async fn run_optimize_command(args: OptimizeArgs) -> anyhow::Result<()> {
    if args.metrics {
        metrics::init_metrics()?;
    }

    let config = optimizer_config(&args)?;
    let client = build_client(&client_config(&args.client)?)?;
    let dataset = load(&args.data, Some(args.limit))?;
    let initial = Prompt::new(args.data.prompt.clone());
    let show = args.show_samples > 0 && !args.json;

    let evaluator = Evaluator::new(client.clone())
        .with_concurrency(config.eval_concurrency)
        .with_temperature(config.task_temperature);

    if show {
        show_samples(
            client.as_ref(),
            &initial,
            &dataset,
            args.show_samples,
            config.task_temperature,
        )
        .await?;
    }
    let before = evaluator.evaluate(&initial, &dataset).await?;
    info!(accuracy = before.accuracy, "Evaluated initial prompt");

    let optimizer = LocalPromptOptimizer::new(client.clone(), config.clone());
    let started = Instant::now();
    let report = optimizer.run(&initial, &dataset).await?;
    let optimization_secs = started.elapsed().as_secs_f64();

    if show {
        show_samples(
            client.as_ref(),
            &report.best_prompt,
            &dataset,
            args.show_samples,
            config.task_temperature,
        )
        .await?;
    }
    let after = evaluator.evaluate(&report.best_prompt, &dataset).await?;
    info!(accuracy = after.accuracy, "Evaluated optimized prompt");

    if args.json {
        let output = OptimizeOutput {
            before_accuracy: before.accuracy,
            after_accuracy: after.accuracy,
            optimization_secs,
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_summary(&report, &before, &after, optimization_secs);
    }

    if args.metrics {
        println!("\n{}", metrics::export_metrics());
    }
    Ok(())
}

#[derive(Serialize)]
struct OptimizeOutput<'a> {
    before_accuracy: f64,
    after_accuracy: f64,
    optimization_secs: f64,
    report: &'a OptimizationReport,
}

fn print_summary(
    report: &OptimizationReport,
    before: &EvaluationResult,
    after: &EvaluationResult,
    optimization_secs: f64,
) {
    println!("\n=== Rounds ===");
    for round in &report.rounds {
        let detail = match &round.outcome {
            RoundOutcome::Rescored => format!(
                "candidate {} ({})",
                round.candidate_score.map(percent).unwrap_or_default(),
                if round.accepted { "new best" } else { "kept best" }
            ),
            RoundOutcome::NoFailures => "no failures left".to_string(),
            RoundOutcome::NoEditRegions => "nothing tagged for editing".to_string(),
            RoundOutcome::Skipped { reason } => format!("skipped: {reason}"),
        };
        println!(
            "Round {}: {} failing, {}",
            round.round, round.failures, detail
        );
    }

    println!("\n=== Optimization Summary ===");
    println!("Run:         {}", report.run_id);
    println!("Initial:     '{}'", report.initial_prompt);
    println!("Optimized:   '{}'", report.best_prompt);
    println!("Stopped:     {:?}", report.stop_reason);
    println!("Elapsed:     {:.2}s", optimization_secs);
    println!();
    println!("Accuracy:");
    println!("  Initial:   {}", percent(before.accuracy));
    println!("  Optimized: {}", percent(after.accuracy));
    println!(
        "  Change:    {:+.2}%",
        (after.accuracy - before.accuracy) * 100.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_optimize_defaults() {
        let cli = Cli::try_parse_from(["prompt-forge", "optimize", "--dataset", "data.json"])
            .unwrap();

        match cli.command {
            Commands::Optimize(args) => {
                assert_eq!(args.limit, DEFAULT_OPTIMIZE_LIMIT);
                assert_eq!(args.data.format, DatasetFormat::Bbh);
                assert_eq!(args.data.prompt, DEFAULT_PROMPT);
                assert!(args.max_rounds.is_none());
                assert!(!args.json);
            }
            Commands::Evaluate(_) => panic!("expected optimize"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_optimize_flags() {
        let cli = Cli::try_parse_from([
            "prompt-forge",
            "--log-level",
            "debug",
            "opt",
            "-d",
            "gsm8k.json",
            "--format",
            "math",
            "--max-rounds",
            "5",
            "--policy",
            "abort",
            "--concurrency",
            "4",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        let Commands::Optimize(args) = cli.command else {
            panic!("expected optimize");
        };
        assert_eq!(args.data.format, DatasetFormat::Math);
        assert_eq!(args.max_rounds, Some(5));
        assert_eq!(args.policy, Some(RoundFailurePolicy::Abort));
        assert_eq!(args.concurrency, Some(4));
    }

    #[test]
    fn test_evaluate_keeps_task_temperature_from_environment_config() {
        let cli = Cli::try_parse_from(["prompt-forge", "evaluate", "--dataset", "data.json"])
            .unwrap();
        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate");
        };
        let base = OptimizerConfig::default()
            .with_task_temperature(0.2)
            .with_eval_concurrency(4);

        let config = evaluate_config(&args, base).unwrap();

        assert_eq!(config.task_temperature, Some(0.2));
        assert_eq!(config.eval_concurrency, 4);
    }

    #[test]
    fn test_evaluate_concurrency_flag_overrides_config() {
        let cli = Cli::try_parse_from([
            "prompt-forge",
            "evaluate",
            "--dataset",
            "data.json",
            "--concurrency",
            "8",
        ])
        .unwrap();
        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate");
        };

        let config = evaluate_config(&args, OptimizerConfig::default()).unwrap();
        assert_eq!(config.eval_concurrency, 8);

        let zero = Cli::try_parse_from([
            "prompt-forge",
            "evaluate",
            "--dataset",
            "data.json",
            "--concurrency",
            "0",
        ])
        .unwrap();
        let Commands::Evaluate(args) = zero.command else {
            panic!("expected evaluate");
        };
        assert!(evaluate_config(&args, OptimizerConfig::default()).is_err());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let result = Cli::try_parse_from([
            "prompt-forge",
            "evaluate",
            "--dataset",
            "data.json",
            "--format",
            "csv",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0.5), "50.00%");
        assert_eq!(percent(1.0), "100.00%");
    }
}
