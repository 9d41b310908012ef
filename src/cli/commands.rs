//! CLI command definitions for promptsmith.

use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::OptimizerConfig;
use crate::embedding::{contextualize, CachedEmbedder, Embedder, HashEmbedder};
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::optimizer::{Evaluation, Evaluator, OptimizationResult, PromptOptimizer};
use crate::store::{
    Outcome, PromptHistory, PromptRecord, RetrievalConfig, SearchFilters, SqliteStore,
    VectorSearch,
};
use crate::utils::preview;

/// Default sqlite database for prompt records.
const DEFAULT_DB: &str = "promptsmith.db";

const EMBEDDING_CACHE_ENTRIES: usize = 1000;

/// Iterative prompt optimizer that learns from past outcomes.
#[derive(Parser)]
#[command(name = "promptsmith")]
#[command(about = "Score, rewrite and iteratively improve LLM prompts")]
#[command(version)]
#[command(
    long_about = "promptsmith scores a prompt against a weighted rubric, rewrites it, and keeps iterating until the score plateaus.\n\nRecorded outcomes are stored in a local sqlite database and used to warm-start later runs.\n\nExample usage:\n  promptsmith optimize \"Write code\" --domain code\n  promptsmith record \"Write code\" --success 0.9 --domain code"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// OpenRouter API key (falls back to LITELLM_API_BASE/LITELLM_API_KEY when unset).
    #[arg(long, env = "OPENROUTER_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model for judge and rewrite calls (defaults to the client's model).
    #[arg(short, long, global = true)]
    pub model: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Optimize a prompt, warm-started from similar recorded prompts.
    #[command(alias = "opt")]
    Optimize(OptimizeArgs),

    /// Score a prompt once against the rubric.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Record an observed outcome for a prompt.
    Record(RecordArgs),

    /// List recorded prompts similar to the given one.
    Search(SearchArgs),
}

/// How prompt text is turned into vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Local feature hashing, no network calls.
    Hash,
    /// The provider's `/embeddings` endpoint.
    Remote,
}

/// Arguments for `promptsmith optimize`.
#[derive(Parser, Debug)]
pub struct OptimizeArgs {
    /// Prompt text to optimize.
    pub prompt: String,

    #[arg(short, long, default_value = "general")]
    pub domain: String,

    #[arg(short, long)]
    pub task_type: Option<String>,

    /// SQLite database holding recorded prompts.
    #[arg(long, default_value = DEFAULT_DB)]
    pub db: String,

    /// Skip retrieval of similar prompts (cold start).
    #[arg(long)]
    pub no_retrieval: bool,

    #[arg(long)]
    pub max_iterations: Option<usize>,

    #[arg(long)]
    pub target_score: Option<f64>,

    /// YAML file with optimizer settings.
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long, value_enum, default_value = "hash")]
    pub embedder: EmbedderKind,

    /// Output JSON instead of a summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `promptsmith evaluate`.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    pub prompt: String,

    #[arg(short, long, default_value = "general")]
    pub domain: String,

    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `promptsmith record`.
#[derive(Parser, Debug)]
pub struct RecordArgs {
    pub prompt: String,

    /// Observed success, 0 to 1.
    #[arg(short, long)]
    pub success: f64,

    #[arg(long)]
    pub latency_ms: Option<f64>,

    /// Observed token efficiency, 0 to 1.
    #[arg(long)]
    pub token_efficiency: Option<f64>,

    #[arg(short, long, default_value = "general")]
    pub domain: String,

    #[arg(short, long)]
    pub task_type: Option<String>,

    #[arg(long, default_value = DEFAULT_DB)]
    pub db: String,

    #[arg(long, value_enum, default_value = "hash")]
    pub embedder: EmbedderKind,
}

/// Arguments for `promptsmith search`.
#[derive(Parser, Debug)]
pub struct SearchArgs {
    pub prompt: String,

    #[arg(short, long, default_value = "general")]
    pub domain: String,

    #[arg(short, long)]
    pub task_type: Option<String>,

    #[arg(short = 'k', long, default_value = "5")]
    pub top_k: usize,

    #[arg(long, default_value = "0.0")]
    pub min_performance: f64,

    /// Search across every domain.
    #[arg(long)]
    pub all_domains: bool,

    #[arg(long, default_value = DEFAULT_DB)]
    pub db: String,

    #[arg(long, value_enum, default_value = "hash")]
    pub embedder: EmbedderKind,

    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let connection = Connection {
        api_key: cli.api_key,
        model: cli.model,
    };
    match cli.command {
        Commands::Optimize(args) => run_optimize_command(&connection, args).await,
        Commands::Evaluate(args) => run_evaluate_command(&connection, args).await,
        Commands::Record(args) => run_record_command(&connection, args).await,
        Commands::Search(args) => run_search_command(&connection, args).await,
    }
}

/// Provider settings shared by every subcommand.
struct Connection {
    api_key: Option<String>,
    model: Option<String>,
}

impl Connection {
    fn client(&self) -> anyhow::Result<LiteLlmClient> {
        if let Some(ref key) = self.api_key {
            info!("Using OpenRouter with specified API key");
            return Ok(LiteLlmClient::new_with_defaults(key.clone()));
        }

        info!("Using LiteLLM client from environment");
        LiteLlmClient::from_env().map_err(|e| {
            anyhow::anyhow!(
                "Failed to initialize LLM client: {}. \
                 Please provide --api-key or set OPENROUTER_API_KEY or LITELLM_API_BASE.",
                e
            )
        })
    }

    fn provider(&self) -> anyhow::Result<Arc<dyn LlmProvider>> {
        Ok(Arc::new(self.client()?))
    }

    fn embedder(&self, kind: EmbedderKind) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match kind {
            EmbedderKind::Hash => Arc::new(CachedEmbedder::new(
                HashEmbedder::default(),
                EMBEDDING_CACHE_ENTRIES,
            )),
            EmbedderKind::Remote => {
                Arc::new(CachedEmbedder::new(self.client()?, EMBEDDING_CACHE_ENTRIES))
            }
        };
        Ok(embedder)
    }
}

/// Layers defaults, the optional YAML file, environment and flags.
fn resolve_config(args: &OptimizeArgs, model: Option<&str>) -> anyhow::Result<OptimizerConfig> {
    let base = match args.config {
        Some(ref path) => OptimizerConfig::from_yaml_file(path)?,
        None => OptimizerConfig::default(),
    };
    let mut config = base.with_env_overrides()?;

    if let Some(max_iterations) = args.max_iterations {
        config = config.with_max_iterations(max_iterations);
    }
    if let Some(target_score) = args.target_score {
        config = config.with_target_score(target_score);
    }
    if let Some(model) = model {
        config = config.with_model(model);
    }
    config.validate()?;
    Ok(config)
}

/// Warm-start candidates for an optimize run. An unavailable store or
/// embedder means a cold start, never an error.
async fn retrieve_similar(connection: &Connection, args: &OptimizeArgs) -> Vec<PromptRecord> {
    let store = match SqliteStore::open(&args.db).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(db = %args.db, error = %e, "Prompt store unavailable, starting cold");
            return Vec::new();
        }
    };
    let embedder = match connection.embedder(args.embedder) {
        Ok(embedder) => embedder,
        Err(e) => {
            warn!(error = %e, "Embedder unavailable, starting cold");
            return Vec::new();
        }
    };

    PromptHistory::new(embedder, store)
        .retrieve(
            &args.prompt,
            &args.domain,
            args.task_type.as_deref(),
            &RetrievalConfig::default(),
        )
        .await
}

async fn run_optimize_command(connection: &Connection, args: OptimizeArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args, connection.model.as_deref())?;
    let llm = connection.provider()?;

    let similar = if args.no_retrieval {
        Vec::new()
    } else {
        retrieve_similar(connection, &args).await
    };
    info!(similar = similar.len(), "Retrieved similar prompts");

    let optimizer = PromptOptimizer::new(llm, config);
    let result = optimizer
        .optimize(&args.prompt, &similar, &args.domain)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_optimization(&result);
    }
    Ok(())
}

fn print_optimization(result: &OptimizationResult) {
    println!("\nPrompt Optimization");
    println!("===================");
    println!(
        "Score: {:.3} -> {:.3} ({:+.3})",
        result.baseline_score, result.final_score, result.estimated_improvement
    );
    println!(
        "Iterations: {} ({:?}), similar prompts used: {}",
        result.iterations, result.stop_reason, result.similar_prompts_used
    );
    println!("\nSteps:");
    for line in &result.improvements {
        println!("  - {}", line);
    }
    println!("\nOptimized prompt:\n{}", result.optimized_prompt);
}

async fn run_evaluate_command(connection: &Connection, args: EvaluateArgs) -> anyhow::Result<()> {
    let mut evaluator = Evaluator::new(connection.provider()?);
    if let Some(ref model) = connection.model {
        evaluator = evaluator.with_model(model.clone());
    }
    let evaluation = evaluator.evaluate(&args.prompt, &args.domain).await?;

    if args.json {
        #[derive(Serialize)]
        struct Output<'a> {
            score: f64,
            evaluation: &'a Evaluation,
        }
        let output = Output {
            score: evaluation.weighted_score(),
            evaluation: &evaluation,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Score: {:.3}", evaluation.weighted_score());
    match evaluation {
        Evaluation::Judged { scores, reasoning } => {
            for (criterion, value) in &scores {
                println!("  {:<14} {:>4.1}", criterion, value);
            }
            if !reasoning.is_empty() {
                println!("Reasoning: {}", reasoning);
            }
        }
        Evaluation::Heuristic { .. } => {
            println!("(judge response unusable, heuristic estimate)");
        }
    }
    Ok(())
}

async fn run_record_command(connection: &Connection, args: RecordArgs) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&args.success) {
        anyhow::bail!("--success must be between 0 and 1, got {}", args.success);
    }

    let mut outcome = Outcome::new(args.success);
    if let Some(latency_ms) = args.latency_ms {
        outcome = outcome.with_latency_ms(latency_ms);
    }
    if let Some(efficiency) = args.token_efficiency {
        outcome = outcome.with_token_efficiency(efficiency);
    }

    let store = Arc::new(SqliteStore::open(&args.db).await?);
    let history = PromptHistory::new(connection.embedder(args.embedder)?, store.clone());
    let record = history
        .record(&args.prompt, &args.domain, args.task_type, &outcome)
        .await?;

    println!(
        "Recorded {} (success rate {:.2}, {} observations, {} records in store)",
        record.id,
        record.metrics.success_rate,
        record.metrics.observation_count,
        store.count().await?
    );
    Ok(())
}

async fn run_search_command(connection: &Connection, args: SearchArgs) -> anyhow::Result<()> {
    let store = SqliteStore::open(&args.db).await?;
    let embedder = connection.embedder(args.embedder)?;

    let query = contextualize(&args.prompt, &args.domain, args.task_type.as_deref());
    let embedded = embedder.embed(&query).await?;

    let mut filters = SearchFilters::new(args.top_k).with_min_performance(args.min_performance);
    if !args.all_domains {
        filters = filters.with_domain(args.domain.clone());
    }
    let hits = store.search(&embedded.vector, &filters).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No similar prompts found.");
        return Ok(());
    }
    for hit in &hits {
        println!(
            "{:.3}  success {:.2}  [{}]  {}",
            hit.similarity,
            hit.record.metrics.success_rate,
            hit.record.domain,
            preview(&hit.record.text, 80)
        );
    }
    Ok(())
}
