//! Prosearch CLI — run a research question from the terminal.

use anyhow::Context;
use clap::Parser;
use prosearch_core::config::{load_config, EvidenceMode};
use prosearch_core::engine::{ResearchEngine, RunObserver, RunRequest};
use prosearch_core::providers::{HttpRetrievalProvider, OpenAiCompatibleProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Prosearch: iterative, citation-aware research over your knowledge base
#[derive(Parser, Debug)]
#[command(name = "prosearch", version, about, long_about = None)]
struct Cli {
    /// The research question
    question: String,

    /// Number of initial search queries to generate
    #[arg(long)]
    initial_queries: Option<usize>,

    /// Maximum reflection loops before finalizing
    #[arg(long)]
    max_loops: Option<usize>,

    /// Model for reflection and answer finalization
    #[arg(short, long)]
    model: Option<String>,

    /// Evidence adaptation mode: threshold, synthesis
    #[arg(long)]
    mode: Option<String>,

    /// Retrieval service base URL (overrides config)
    #[arg(long)]
    retrieval_url: Option<String>,

    /// Workspace directory (searched for .prosearch/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Prints progress lines to stderr as the run advances.
struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn on_queries_generated(&self, queries: &[String]) {
        eprintln!("Searching: {}", queries.join(" | "));
    }
    fn on_evidence_gathered(&self, query: &str, sources_found: usize) {
        eprintln!("  {query}: {sources_found} source(s)");
    }
    fn on_reflection(&self, pass: usize, is_sufficient: bool, follow_ups: usize) {
        if is_sufficient {
            eprintln!("Pass {pass}: evidence sufficient");
        } else {
            eprintln!("Pass {pass}: {follow_ups} follow-up quer(ies) needed");
        }
    }
    fn on_finalizing(&self) {
        eprintln!("Composing answer...");
    }
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("prosearch_core={default_filter}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(Some(&cli.workspace), None)
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to load configuration")?;
    if let Some(url) = cli.retrieval_url {
        config.retrieval.base_url = Some(url);
    }
    config.validate().context("invalid configuration")?;
    debug!(
        workspace = %cli.workspace.display(),
        mode = ?config.run.evidence_mode,
        "Configuration loaded"
    );

    let completion = Arc::new(
        OpenAiCompatibleProvider::new(&config.completion)
            .context("failed to initialize the completion service")?,
    );
    let retrieval = Arc::new(
        HttpRetrievalProvider::new(&config.retrieval)
            .context("failed to initialize the retrieval service")?,
    );

    let mut request = RunRequest::new(&cli.question);
    request.initial_query_count = cli.initial_queries;
    request.max_research_loops = cli.max_loops;
    request.reasoning_model = cli.model;
    request.evidence_mode = cli
        .mode
        .as_deref()
        .map(str::parse::<EvidenceMode>)
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;

    info!(question = %cli.question, "Starting research");
    let engine = ResearchEngine::new(completion, retrieval, config);
    let outcome = if cli.quiet {
        engine.run(request).await?
    } else {
        engine.run_with_observer(request, &ConsoleObserver).await?
    };

    println!("{}", outcome.answer);

    if !outcome.summary_points.is_empty() {
        println!("\nKey points:");
        for point in &outcome.summary_points {
            println!("  - {point}");
        }
    }

    if !outcome.sources.is_empty() {
        println!("\nSources:");
        for source in &outcome.sources {
            println!("  {} — {}", source.title, source.url);
        }
    }

    if !cli.quiet {
        eprintln!(
            "\n{} quer(ies), {} reflection pass(es), {} source(s) gathered",
            outcome.stats.queries_dispatched,
            outcome.stats.reflection_passes,
            outcome.stats.sources_gathered,
        );
    }

    Ok(())
}
