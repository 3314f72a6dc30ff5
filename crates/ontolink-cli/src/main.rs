mod batch;
mod display;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use ontolink_ai::{OpenAiReasoner, Orchestrator, OrchestratorConfig, ReasonerConfig};
use ontolink_core::{OntologyBinding, SynonymTable};
use ontolink_search::{CachedSearch, DEFAULT_OLS_URL, OlsClient, OntologySearch, Vocabulary};
use tracing::{Level, info};

/// Row of the single-cell metadata sheet used when no text is given.
const DEFAULT_TEXT: &str = "C_goblet\tColon goblet cells\tColonic goblet cells; Mucus-producing cells; GC\tCrypt-resident goblet cells; Intercrypt goblet cells; Early goblet cells";

#[derive(Parser)]
#[command(name = "ontolink", version, about = "Annotate free text with ontology terms")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find concept mentions in text and link them to ontology terms
    Annotate(AnnotateArgs),
    /// Ask a free-form question answered with ontology searches
    Ask(AskArgs),
    /// Query the ontology search backend directly
    Search(SearchArgs),
}

#[derive(Args)]
struct BackendArgs {
    /// Ontology to annotate against (cl, uberon)
    #[arg(short, long, default_value = "cl")]
    ontology: OntologyBinding,

    /// Search a local JSON vocabulary instead of OLS
    #[arg(long)]
    vocabulary: Option<PathBuf>,

    /// OLS base URL
    #[arg(long, env = "ONTOLINK_OLS_URL", default_value = DEFAULT_OLS_URL)]
    ols_url: String,

    /// OLS request timeout in seconds
    #[arg(long, default_value_t = 30)]
    ols_timeout: u64,
}

#[derive(Args)]
struct ReasonerArgs {
    /// Chat model name
    #[arg(long, env = "ONTOLINK_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,
}

#[derive(Args)]
struct AnnotateArgs {
    /// Texts to annotate, one invocation each
    text: Vec<String>,

    /// Read texts from a file, one per line
    #[arg(short, long, conflicts_with = "text")]
    input: Option<PathBuf>,

    #[command(flatten)]
    backend: BackendArgs,

    /// Reasoner round-trips allowed per text
    #[arg(long, default_value_t = 24)]
    turn_budget: usize,

    /// Searches per span, including the verbatim one
    #[arg(long, default_value_t = 8)]
    max_attempts: usize,

    /// Candidates kept from each search
    #[arg(long, default_value_t = 10)]
    max_candidates: usize,

    /// Texts annotated concurrently
    #[arg(short, long, default_value_t = 4)]
    jobs: usize,

    /// Extra synonym groups (JSON array of string arrays)
    #[arg(long)]
    synonyms: Option<PathBuf>,

    /// Fail when no search reached the backend
    #[arg(long)]
    strict_backend: bool,

    /// Print one JSON document per text
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    reasoner: ReasonerArgs,
}

#[derive(Args)]
struct AskArgs {
    /// Question about the ontology
    #[arg(default_value = "What is the CL ID for a goblet cell?")]
    question: String,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(flatten)]
    reasoner: ReasonerArgs,

    /// Reasoner round-trips allowed
    #[arg(long, default_value_t = 24)]
    turn_budget: usize,

    /// Print the answer and run counts as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// Term to search for
    term: String,

    #[command(flatten)]
    backend: BackendArgs,

    /// Print candidates as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
    info!("ontolink v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Annotate(args) => run_annotate(args).await,
        Command::Ask(args) => run_ask(args).await,
        Command::Search(args) => run_search(args).await,
    }
}

fn search_backend(args: &BackendArgs) -> Result<Arc<dyn OntologySearch>> {
    let backend: Arc<dyn OntologySearch> = match &args.vocabulary {
        Some(path) => Arc::new(Vocabulary::load(path)?),
        None => {
            let client = OlsClient::new(args.ols_url.clone())
                .with_timeout(Duration::from_secs(args.ols_timeout))
                .context("failed to build OLS client")?;
            info!(url = %args.ols_url, "searching OLS");
            Arc::new(client)
        }
    };
    Ok(backend)
}

fn build_reasoner(args: &ReasonerArgs) -> Result<OpenAiReasoner> {
    let mut config = ReasonerConfig::from_env();
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    OpenAiReasoner::new(config).context("failed to configure the reasoner")
}

fn read_texts(args: &AnnotateArgs) -> Result<Vec<String>> {
    if let Some(path) = &args.input {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let texts: Vec<String> = raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        if texts.is_empty() {
            bail!("{} contains no texts", path.display());
        }
        return Ok(texts);
    }
    if args.text.is_empty() {
        return Ok(vec![DEFAULT_TEXT.to_string()]);
    }
    Ok(args.text.clone())
}

async fn run_annotate(args: AnnotateArgs) -> Result<()> {
    let texts = read_texts(&args)?;
    let binding = args.backend.ontology.clone();

    let cache = Arc::new(CachedSearch::new(search_backend(&args.backend)?));

    let reasoner = build_reasoner(&args.reasoner)?;
    info!(model = reasoner.model(), ontology = binding.prefix(), "annotating");

    let mut synonyms = SynonymTable::builtin();
    if let Some(path) = &args.synonyms {
        synonyms.extend(SynonymTable::load(path)?);
    }
    let summary = synonyms.summary();
    info!(
        groups = summary.groups,
        phrases = summary.phrases,
        "synonym table ready"
    );

    let config = OrchestratorConfig {
        turn_budget: args.turn_budget,
        max_attempts_per_span: args.max_attempts,
        max_candidates: args.max_candidates,
        fail_on_backend_outage: args.strict_backend,
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(Arc::new(reasoner), cache.clone(), binding.clone(), config)
        .with_synonyms(synonyms);

    let (results, stats) = batch::annotate_all(&orchestrator, &texts, args.jobs).await;

    for (text, result) in texts.iter().zip(&results) {
        match result {
            Ok(annotated) => {
                if args.json {
                    println!("{}", display::annotated_json(&binding, text, annotated));
                } else {
                    print!("{}", display::render_result(&annotated.result));
                }
                eprintln!("{}", display::render_summary(&annotated.report));
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    let cache_stats = cache.stats().await;
    info!(
        texts = stats.texts,
        spans = stats.spans,
        resolved = stats.resolved,
        failed = stats.failed,
        cache_hits = cache_stats.hits,
        cache_misses = cache_stats.misses,
        elapsed_secs = stats.elapsed_secs,
        "annotation complete"
    );

    if stats.failed > 0 {
        bail!("{} of {} texts failed", stats.failed, stats.texts);
    }
    Ok(())
}

async fn run_ask(args: AskArgs) -> Result<()> {
    let binding = args.backend.ontology.clone();
    let backend = search_backend(&args.backend)?;
    let reasoner = build_reasoner(&args.reasoner)?;
    info!(model = reasoner.model(), ontology = binding.prefix(), "asking");

    let config = OrchestratorConfig {
        turn_budget: args.turn_budget,
        ..OrchestratorConfig::default()
    };
    let answer = Orchestrator::new(Arc::new(reasoner), backend, binding, config)
        .ask(&args.question)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }
    match &answer.text {
        Some(text) => println!("{text}"),
        None => bail!(
            "turn budget exhausted after {} turns without an answer",
            answer.turns_used
        ),
    }
    Ok(())
}

async fn run_search(args: SearchArgs) -> Result<()> {
    let backend = search_backend(&args.backend)?;
    let candidates = backend
        .search(&args.backend.ontology, &args.term)
        .await
        .with_context(|| format!("search for {:?} failed", args.term))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
    } else {
        print!("{}", display::render_candidates(&args.term, &candidates));
    }
    Ok(())
}
