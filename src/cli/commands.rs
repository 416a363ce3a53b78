//! CLI command definitions for bench-forge.
//!
//! `run` evaluates one agent against a benchmark directory, `exec` pushes a
//! single program through the sandbox and `list` shows the category table.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::agents::{Agent, CommandAgent, LlmAgent};
use crate::bench::JsonTaskStore;
use crate::categories::{Category, CategoryRegistry};
use crate::grader::Grader;
use crate::llm::{LiteLlmClient, LlmProvider, DEFAULT_MODEL};
use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{EvalConfig, Orchestrator, PipelineConfig};
use crate::sandbox::{Isolation, SandboxConfig, SandboxExecutor};

/// Default directory for run artifacts.
const DEFAULT_OUTPUT_DIR: &str = "./bench-results";

/// Agent benchmarking harness.
#[derive(Parser)]
#[command(name = "bench-forge")]
#[command(about = "Evaluate an agent on a weighted benchmark of categories")]
#[command(version)]
#[command(
    long_about = "bench-forge samples tasks per category, runs the agent on each one, grades the answers in a sandbox or with an LLM judge and reports weighted scores.\n\nExample usage:\n  bench-forge run --config eval.yaml --benchmark-dir ./benchmark --agent-cmd ./my-agent"
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
    /// Evaluate an agent with an evaluation config.
    #[command(alias = "eval")]
    Run(RunArgs),

    /// Run one program through the sandbox and print the outcome.
    Exec(ExecArgs),

    /// Show the category taxonomy, or the registry resolved from a config.
    #[command(alias = "ls")]
    List(ListArgs),
}

/// Arguments for `bench-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Evaluation config (YAML).
    #[arg(short = 'c', long)]
    pub config: PathBuf,

    /// Benchmark root containing `public/` and `private/`.
    #[arg(short = 'b', long)]
    pub benchmark_dir: PathBuf,

    /// External agent command; the instruction is written to its stdin.
    #[arg(long, conflicts_with = "agent_model", required_unless_present = "agent_model")]
    pub agent_cmd: Option<String>,

    /// Evaluate a plain chat model instead of an external agent.
    #[arg(long)]
    pub agent_model: Option<String>,

    /// Model used for LLM grading.
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub grader_model: String,

    /// API key (can also be set via OPENROUTER_API_KEY or LITELLM_API_KEY env var).
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub api_key: Option<String>,

    /// Seed for task sampling [env: BENCH_SEED, default: 0].
    #[arg(long)]
    pub seed: Option<u64>,

    /// Generation pool width [env: BENCH_GENERATION_WORKERS, default: 8].
    #[arg(long)]
    pub generation_workers: Option<usize>,

    /// Grading pool width [env: BENCH_GRADING_WORKERS, default: 12].
    #[arg(long)]
    pub grading_workers: Option<usize>,

    /// Sandbox deadline in seconds [env: BENCH_SANDBOX_TIMEOUT_SECS, default: 5].
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Directory for result.json and log.json.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Print the result as JSON instead of the report.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Also write Prometheus metrics to this file.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// Grade code without namespace isolation (resource limits only).
    #[arg(long)]
    pub no_isolation: bool,
}

/// Arguments for `bench-forge exec`.
#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// Program to run.
    pub file: PathBuf,

    /// Deadline in seconds.
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// Interpreter; defaults to isolated python3.
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Print the outcome as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Run without namespace isolation (resource limits only).
    #[arg(long)]
    pub no_isolation: bool,
}

/// Arguments for `bench-forge list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show the registry this config resolves to.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
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
        Commands::Run(args) => run_eval_command(args).await,
        Commands::Exec(args) => run_exec_command(args).await,
        Commands::List(args) => run_list_command(args),
    }
}

async fn run_eval_command(args: RunArgs) -> anyhow::Result<()> {
    let eval_config = EvalConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load eval config {}", args.config.display()))?;

    if !args.benchmark_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Benchmark directory does not exist: {}",
            args.benchmark_dir.display()
        ));
    }

    if let Err(e) = init_metrics() {
        warn!(error = %e, "Metrics registry unavailable");
    }

    let mut pipeline_config = PipelineConfig::from_env()?;
    if let Some(workers) = args.generation_workers {
        pipeline_config = pipeline_config.with_generation_workers(workers);
    }
    if let Some(workers) = args.grading_workers {
        pipeline_config = pipeline_config.with_grading_workers(workers);
    }
    if let Some(seed) = args.seed {
        pipeline_config = pipeline_config.with_seed(seed);
    }
    if let Some(secs) = args.timeout {
        pipeline_config.sandbox.timeout = Duration::from_secs(secs);
    }
    if args.no_isolation {
        pipeline_config.sandbox.isolation = Isolation::Off;
    }

    let registry = CategoryRegistry::from_config(&eval_config)?;
    if registry.needs_sandbox() {
        SandboxExecutor::new(pipeline_config.sandbox.clone())
            .preflight()
            .await
            .context("Sandbox self-check failed; --no-isolation skips namespace confinement")?;
    }
    let needs_llm = registry.needs_grader() || args.agent_model.is_some();
    let provider = if needs_llm {
        Some(build_llm_client(args.api_key.clone())?)
    } else {
        None
    };

    let grader = match (&provider, registry.needs_grader()) {
        (Some(provider), true) => Some(Grader::new(Arc::clone(provider), args.grader_model.clone())),
        _ => None,
    };

    let mut agent: Box<dyn Agent> = match (&args.agent_cmd, &args.agent_model, &provider) {
        (Some(line), _, _) => Box::new(CommandAgent::from_command_line(line)?),
        (None, Some(model), Some(provider)) => Box::new(LlmAgent::new(Arc::clone(provider), model.clone())),
        _ => return Err(anyhow::anyhow!("Either --agent-cmd or --agent-model is required")),
    };

    let store = Arc::new(JsonTaskStore::new(&args.benchmark_dir));
    let orchestrator = Orchestrator::new(&eval_config, pipeline_config, store, grader)?;

    info!(
        config = %args.config.display(),
        agent = agent.name(),
        samples = orchestrator.registry().total_samples(),
        "Running evaluation"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let run = orchestrator.run_until(agent.as_mut(), shutdown).await?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    write_json(&args.output.join("result.json"), &run.result)?;
    write_json(&args.output.join("log.json"), &run.log)?;
    if let Some(path) = &args.metrics_out {
        fs::write(path, export_metrics())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("{}", run.result.report());
        println!("Results written to {}", args.output.display());
    }
    Ok(())
}

async fn run_exec_command(args: ExecArgs) -> anyhow::Result<()> {
    let program = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let mut config = match &args.interpreter {
        Some(interpreter) => SandboxConfig::new(interpreter.clone()),
        None => SandboxConfig::default(),
    };
    if args.no_isolation {
        config.isolation = Isolation::Off;
    }
    let executor = SandboxExecutor::new(config);
    let outcome = executor
        .execute(&program, Duration::from_secs(args.timeout))
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome);
    }
    Ok(())
}

fn run_list_command(args: ListArgs) -> anyhow::Result<()> {
    if let Some(path) = &args.config {
        let config = EvalConfig::from_file(path)
            .with_context(|| format!("Failed to load eval config {}", path.display()))?;
        let registry = CategoryRegistry::from_config(&config)?;

        println!("{:<36} {:<12} {:<12} {:>6}", "Subclass", "Evaluator", "Grading", "Weight");
        for entry in registry.entries() {
            println!(
                "{:<36} {:<12} {:<12} {:>6}",
                entry.key(),
                entry.evaluator.to_string(),
                entry.strategy.to_string(),
                entry.weight
            );
        }
        for key in registry.placeholders() {
            println!("{:<36} {:<12} {:<12} {:>6}", key, "-", "-", 0);
        }
        println!("Total samples: {}", registry.total_samples());
        return Ok(());
    }

    for category in Category::all() {
        println!("{} ({})", category.display_name(), category.as_str());
        for subclass in category.subcategories() {
            match category.default_evaluator(subclass) {
                Some((kind, strategy)) => println!("  {:<28} {:<12} {}", subclass, kind.to_string(), strategy),
                None => println!("  {:<28} {:<12} -", subclass, "placeholder"),
            }
        }
    }
    Ok(())
}

fn build_llm_client(api_key: Option<String>) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let resolved_api_key = api_key.or_else(|| std::env::var("LITELLM_API_KEY").ok());

    if std::env::var("LITELLM_API_BASE").is_ok() {
        info!("Using LiteLLM client from environment");
        return Ok(Arc::new(LiteLlmClient::from_env()?));
    }

    match resolved_api_key {
        Some(key) => {
            info!("Using OpenRouter with specified API key");
            Ok(Arc::new(LiteLlmClient::new_with_defaults(key)))
        }
        None => Err(anyhow::anyhow!(
            "An LLM is needed for grading or as the agent. \
             Please provide --api-key or set OPENROUTER_API_KEY/LITELLM_API_KEY env var."
        )),
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "bench-forge",
            "run",
            "--config",
            "eval.yaml",
            "--benchmark-dir",
            "bench",
            "--agent-cmd",
            "./agent --fast",
            "--seed",
            "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.seed, Some(7));
                assert_eq!(args.generation_workers, None);
                assert_eq!(args.grading_workers, None);
                assert_eq!(args.agent_cmd.as_deref(), Some("./agent --fast"));
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_run_requires_an_agent() {
        assert!(Cli::try_parse_from([
            "bench-forge",
            "run",
            "--config",
            "eval.yaml",
            "--benchmark-dir",
            "bench",
        ])
        .is_err());
    }

    #[test]
    fn test_list_with_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("eval.yaml");
        fs::write(&path, "reasoning:\n  coding: 2\n").unwrap();
        assert!(run_list_command(ListArgs { config: Some(path) }).is_ok());
        assert!(run_list_command(ListArgs { config: None }).is_ok());
    }

    #[tokio::test]
    async fn test_exec_with_shell() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("prog.sh");
        fs::write(&path, "true\n").unwrap();
        let args = ExecArgs {
            file: path,
            timeout: 2,
            interpreter: Some("/bin/sh".to_string()),
            json: false,
            no_isolation: true,
        };
        assert!(run_exec_command(args).await.is_ok());
    }
}
